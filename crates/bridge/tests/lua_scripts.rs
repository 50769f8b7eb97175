//! Runs every script under tests/lua against the test schema.
//!
//! Scripts use plain `assert` plus two helpers installed here:
//! `expect_error(pattern, fn, ...)` and `count_range(map)`.

#[path = "../src/fixtures.rs"]
mod fixtures;

use std::fs;
use std::path::{Path, PathBuf};

use protolua_bridge::{ProtoLib, ResourceBudget, RuntimeLimits, ScriptRuntime};

const PRELUDE: &str = r#"
function expect_error(pattern, f, ...)
    local ok, err = pcall(f, ...)
    assert(not ok, "expected an error matching '" .. pattern .. "'")
    local text = tostring(err)
    assert(string.find(text, pattern, 1, true), "error '" .. text .. "' does not contain '" .. pattern .. "'")
end

function count_range(map)
    local n = 0
    for _ in map:Range() do n = n + 1 end
    return n
end
"#;

fn scripts() -> Vec<PathBuf> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/lua");
    let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
        .expect("tests/lua exists")
        .map(|entry| entry.expect("readable entry").path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "lua"))
        .collect();
    paths.sort();
    paths
}

fn run_script(path: &Path, budget: &ResourceBudget) {
    let lib = ProtoLib::new(fixtures::pool()).with_budget(budget.clone());
    let rt = ScriptRuntime::new(&lib, RuntimeLimits::default()).unwrap();
    let prelude = rt.run(PRELUDE, "prelude.lua");
    assert!(prelude.is_ok(), "prelude: {:?}", prelude.error);

    let source = fs::read_to_string(path).unwrap();
    let name = path.file_name().unwrap().to_string_lossy();
    let result = rt.run(&source, &name);
    assert!(
        result.is_ok(),
        "{name} failed: {}\noutput:\n{}",
        result.error.unwrap_or_default(),
        result.output.join("\n")
    );
    // The runtime is still alive here: every producer must have been closed
    // by the loops themselves.
    assert_eq!(budget.outstanding(), 0, "{name} left a map enumeration running");
}

#[test]
fn test_lua_scripts() {
    let paths = scripts();
    assert!(!paths.is_empty(), "no Lua test scripts found");
    for path in paths {
        run_script(&path, &ResourceBudget::unlimited());
    }
}
