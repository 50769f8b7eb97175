// Integration tests for the `protolua` binary.
// Run with: cargo test -p protolua-cli --test cli_tests
//
// Every test writes its own descriptor set and settings file into a temp
// directory and passes --config explicitly, so the user's settings never leak in.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use prost::Message;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, FieldDescriptorProto, FileDescriptorProto, FileDescriptorSet, MessageOptions,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

// package demo;
// message Person {
//   string name = 1;
//   repeated string tags = 2;
//   map<string, int32> scores = 3;
// }
fn demo_set() -> FileDescriptorSet {
    let field = |name: &str, number: i32, label: Label, ty: Type| FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(label as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    };
    let scores_entry = DescriptorProto {
        name: Some("ScoresEntry".to_string()),
        field: vec![
            field("key", 1, Label::Optional, Type::String),
            field("value", 2, Label::Optional, Type::Int32),
        ],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };
    let person = DescriptorProto {
        name: Some("Person".to_string()),
        field: vec![
            field("name", 1, Label::Optional, Type::String),
            field("tags", 2, Label::Repeated, Type::String),
            FieldDescriptorProto {
                type_name: Some(".demo.Person.ScoresEntry".to_string()),
                ..field("scores", 3, Label::Repeated, Type::Message)
            },
        ],
        nested_type: vec![scores_entry],
        ..Default::default()
    };
    FileDescriptorSet {
        file: vec![FileDescriptorProto {
            name: Some("demo.proto".to_string()),
            package: Some("demo".to_string()),
            syntax: Some("proto3".to_string()),
            message_type: vec![person],
            ..Default::default()
        }],
    }
}

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new(settings: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("demo.pb"), demo_set().encode_to_vec()).unwrap();
        fs::write(dir.path().join("settings.toml"), settings).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).unwrap();
        path
    }

    /// `protolua <args> --config settings.toml -d demo.pb`
    fn protolua(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_protolua"));
        cmd.args(args)
            .arg("--config")
            .arg(self.path("settings.toml"))
            .arg("-d")
            .arg(self.path("demo.pb"))
            .env_remove("PROTOLUA_CONFIG");
        cmd
    }
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("failed to run protolua")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn script_path(ws: &Workspace, body: &str) -> String {
    ws.write("script.lua", body).to_string_lossy().into_owned()
}

fn code(out: &Output) -> i32 {
    out.status.code().expect("exited normally")
}

fn assert_path_exists(path: &Path) {
    assert!(path.exists(), "{} missing", path.display());
}

// ---------------------------------------------------------------------------
// Success paths
// ---------------------------------------------------------------------------

#[test]
fn test_types_lists_messages_without_map_entries() {
    let ws = Workspace::new("");
    let out = run(&mut ws.protolua(&["types"]));
    assert_eq!(code(&out), 0, "{}", stderr(&out));
    assert_eq!(stdout(&out), "demo.Person\n");
}

#[test]
fn test_types_prefix_filter() {
    let ws = Workspace::new("");
    let out = run(&mut ws.protolua(&["types", "other."]));
    assert_eq!(code(&out), 0);
    assert_eq!(stdout(&out), "");
}

#[test]
fn test_run_script_prints_output() {
    let ws = Workspace::new("");
    let script = script_path(
        &ws,
        r#"
        local p = proto.new("demo.Person")
        p.name = "Ada"
        local copy = proto.unmarshal("demo.Person", p:Marshal())
        print(copy.name, #copy.tags, copy == p)
        print(p)
        "#,
    );
    let out = run(&mut ws.protolua(&["run", &script]));
    assert_eq!(code(&out), 0, "{}", stderr(&out));
    assert_eq!(stdout(&out), "Ada\t0\ttrue\nproto.Message<demo.Person>\n");
}

#[test]
fn test_run_from_stdin() {
    let ws = Workspace::new("");
    let mut child = ws
        .protolua(&["run", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"print(proto.type('demo.Person'):FullName())")
        .unwrap();
    let out = child.wait_with_output().unwrap();
    assert_eq!(code(&out), 0, "{}", stderr(&out));
    assert_eq!(stdout(&out), "demo.Person\n");
}

#[test]
fn test_eval_expression_prints_value() {
    let ws = Workspace::new("");
    let out = run(&mut ws.protolua(&["eval", "proto.new('demo.Person'):ReadOnly()"]));
    assert_eq!(code(&out), 0, "{}", stderr(&out));
    assert_eq!(stdout(&out), "proto.Message<demo.Person> (read-only)\n");
}

#[test]
fn test_descriptor_sets_from_settings_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("schemas")).unwrap();
    fs::write(dir.path().join("schemas/demo.pb"), demo_set().encode_to_vec()).unwrap();
    let settings = dir.path().join("settings.toml");
    fs::write(&settings, "[proto]\ndescriptor_sets = [\"schemas/demo.pb\"]\n").unwrap();
    assert_path_exists(&settings);

    let out = run(Command::new(env!("CARGO_BIN_EXE_protolua"))
        .args(["types", "--config"])
        .arg(&settings)
        .env_remove("PROTOLUA_CONFIG"));
    assert_eq!(code(&out), 0, "{}", stderr(&out));
    assert_eq!(stdout(&out), "demo.Person\n");
}

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

#[test]
fn test_script_error_exits_1() {
    let ws = Workspace::new("");
    let script = script_path(&ws, "print('before')\nproto.new('demo.Person').bogus = 1\n");
    let out = run(&mut ws.protolua(&["run", &script]));
    assert_eq!(code(&out), 1);
    assert_eq!(stdout(&out), "before\n");
    assert!(stderr(&out).contains("no such field 'bogus'"), "{}", stderr(&out));
}

#[test]
fn test_syntax_error_exits_1() {
    let ws = Workspace::new("");
    let out = run(&mut ws.protolua(&["eval", "local = 1"]));
    assert_eq!(code(&out), 1);
    assert!(stderr(&out).starts_with("error: "));
}

#[test]
fn test_missing_subcommand_exits_2() {
    let out = run(Command::new(env!("CARGO_BIN_EXE_protolua")).env_remove("PROTOLUA_CONFIG"));
    assert_eq!(code(&out), 2);
}

#[test]
fn test_missing_script_exits_3() {
    let ws = Workspace::new("");
    let missing = ws.path("nope.lua").to_string_lossy().into_owned();
    let out = run(&mut ws.protolua(&["run", &missing]));
    assert_eq!(code(&out), 3);
    assert!(stderr(&out).contains("nope.lua"));
}

#[test]
fn test_invalid_descriptor_set_exits_4() {
    let ws = Workspace::new("");
    let bad = ws.path("bad.pb");
    fs::write(&bad, b"\xff\xff\xff\xff").unwrap();
    let out = run(ws.protolua(&["types"]).arg("-d").arg(&bad));
    assert_eq!(code(&out), 4);
    assert!(stderr(&out).contains("hint:"));
}

#[test]
fn test_invalid_config_exits_5() {
    let ws = Workspace::new("[runtime]\nhook_interval = 0\n");
    let out = run(&mut ws.protolua(&["types"]));
    assert_eq!(code(&out), 5);
    assert!(stderr(&out).contains("hook_interval"));

    let ws = Workspace::new("[runtime\n");
    let out = run(&mut ws.protolua(&["types"]));
    assert_eq!(code(&out), 5);
}

#[test]
fn test_instruction_limit_exits_6() {
    let ws = Workspace::new("[runtime]\ninstruction_limit = 20000\nhook_interval = 1000\n");
    let out = run(&mut ws.protolua(&["eval", "while true do end"]));
    assert_eq!(code(&out), 6);
    assert!(stderr(&out).contains("instruction limit exceeded"));
}

#[test]
fn test_enumeration_budget_from_settings() {
    // Room for exactly one producer at a time. Two entries keep the outer
    // producer blocked on its second offer while the inner loop starts.
    let ws = Workspace::new(
        "[proto]\nproducer_overhead_bytes = 65536\nenumeration_budget_bytes = 65536\n",
    );
    let script = script_path(
        &ws,
        r#"
        local p = proto.unmarshal("demo.Person", "\26\5\10\1a\16\1\26\5\10\1b\16\2")
        assert(#p.scores == 2)
        for _ in p.scores:Range() do end
        for _ in p.scores:Range() do end
        print("sequential ok")
        for _ in p.scores:Range() do
            for _ in p.scores:Range() do end
        end
        "#,
    );
    let out = run(&mut ws.protolua(&["run", &script]));
    assert_eq!(code(&out), 1);
    assert_eq!(stdout(&out), "sequential ok\n");
    assert!(stderr(&out).contains("resource budget exhausted"), "{}", stderr(&out));
}
