// Test schema, built in code so tests need no protoc.
//
// package test;
//
// enum Color { COLOR_UNSPECIFIED = 0; RED = 1; GREEN = 2; }
// enum Shade { SHADE_UNSPECIFIED = 0; LIGHT = 1; DARK = 2; }
//
// message Inner {
//   string label = 1;
//   optional int32 weight = 2;
//   map<string, int32> counts = 3;
// }
//
// message Scalars {
//   bool b = 1;          int32 i32 = 2;       int64 i64 = 3;
//   uint32 u32 = 4;      uint64 u64 = 5;      float f = 6;
//   double d = 7;        string s = 8;        bytes by = 9;
//   Color color = 10;    sint32 si32 = 11;    fixed32 fx32 = 12;
//   sfixed64 sf64 = 13;  optional string opt = 14;
//   Inner inner = 15;
//   repeated string tags = 16;
//   repeated Inner items = 17;
//   map<string, int32> meta = 18;
//   map<int32, Inner> by_id = 19;
//   map<bool, string> flags = 20;
//   map<uint64, Color> codes = 21;
//   repeated Color colors = 22;
//   sfixed32 sfx32 = 23;
//   map<string, int64> wide = 24;
//   repeated int64 longs = 25;
//   repeated Shade shades = 26;
//   map<uint64, Shade> shade_codes = 27;
//   repeated T ts = 28;
//   map<int32, T> t_by_id = 29;
// }
//
// message T {
//   string name = 1;
//   repeated string tags = 2;
//   map<string, int32> meta = 3;
// }
//
// The "other" package holds a second `Inner` with a different full name, and
// `dynamic_pool()` holds a type unknown to `pool()`.

#![allow(dead_code)]

use prost_reflect::DescriptorPool;
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MessageOptions, OneofDescriptorProto,
};

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        json_name: Some(name.to_string()),
        ..Default::default()
    }
}

fn typed(name: &str, number: i32, ty: Type, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.to_string()),
        ..field(name, number, ty)
    }
}

fn repeated(mut f: FieldDescriptorProto) -> FieldDescriptorProto {
    f.label = Some(Label::Repeated as i32);
    f
}

fn optional(mut f: FieldDescriptorProto, oneof_index: i32) -> FieldDescriptorProto {
    f.proto3_optional = Some(true);
    f.oneof_index = Some(oneof_index);
    f
}

fn map_entry(name: &str, key: FieldDescriptorProto, value: FieldDescriptorProto) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.to_string()),
        field: vec![key, value],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn map_field(name: &str, number: i32, entry_type: &str) -> FieldDescriptorProto {
    repeated(typed(name, number, Type::Message, entry_type))
}

fn oneof(name: &str) -> OneofDescriptorProto {
    OneofDescriptorProto {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn enumeration(name: &str, values: &[&str]) -> EnumDescriptorProto {
    EnumDescriptorProto {
        name: Some(name.to_string()),
        value: values
            .iter()
            .enumerate()
            .map(|(i, name)| EnumValueDescriptorProto {
                name: Some(name.to_string()),
                number: Some(i as i32),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn test_file() -> FileDescriptorProto {
    let color = enumeration("Color", &["COLOR_UNSPECIFIED", "RED", "GREEN"]);
    let shade = enumeration("Shade", &["SHADE_UNSPECIFIED", "LIGHT", "DARK"]);

    let inner = DescriptorProto {
        name: Some("Inner".to_string()),
        field: vec![
            field("label", 1, Type::String),
            optional(field("weight", 2, Type::Int32), 0),
            map_field("counts", 3, ".test.Inner.CountsEntry"),
        ],
        nested_type: vec![map_entry(
            "CountsEntry",
            field("key", 1, Type::String),
            field("value", 2, Type::Int32),
        )],
        oneof_decl: vec![oneof("_weight")],
        ..Default::default()
    };

    let scalars = DescriptorProto {
        name: Some("Scalars".to_string()),
        field: vec![
            field("b", 1, Type::Bool),
            field("i32", 2, Type::Int32),
            field("i64", 3, Type::Int64),
            field("u32", 4, Type::Uint32),
            field("u64", 5, Type::Uint64),
            field("f", 6, Type::Float),
            field("d", 7, Type::Double),
            field("s", 8, Type::String),
            field("by", 9, Type::Bytes),
            typed("color", 10, Type::Enum, ".test.Color"),
            field("si32", 11, Type::Sint32),
            field("fx32", 12, Type::Fixed32),
            field("sf64", 13, Type::Sfixed64),
            optional(field("opt", 14, Type::String), 0),
            typed("inner", 15, Type::Message, ".test.Inner"),
            repeated(field("tags", 16, Type::String)),
            repeated(typed("items", 17, Type::Message, ".test.Inner")),
            map_field("meta", 18, ".test.Scalars.MetaEntry"),
            map_field("by_id", 19, ".test.Scalars.ByIdEntry"),
            map_field("flags", 20, ".test.Scalars.FlagsEntry"),
            map_field("codes", 21, ".test.Scalars.CodesEntry"),
            repeated(typed("colors", 22, Type::Enum, ".test.Color")),
            field("sfx32", 23, Type::Sfixed32),
            map_field("wide", 24, ".test.Scalars.WideEntry"),
            repeated(field("longs", 25, Type::Int64)),
            repeated(typed("shades", 26, Type::Enum, ".test.Shade")),
            map_field("shade_codes", 27, ".test.Scalars.ShadeCodesEntry"),
            repeated(typed("ts", 28, Type::Message, ".test.T")),
            map_field("t_by_id", 29, ".test.Scalars.TByIdEntry"),
        ],
        nested_type: vec![
            map_entry(
                "MetaEntry",
                field("key", 1, Type::String),
                field("value", 2, Type::Int32),
            ),
            map_entry(
                "ByIdEntry",
                field("key", 1, Type::Int32),
                typed("value", 2, Type::Message, ".test.Inner"),
            ),
            map_entry(
                "FlagsEntry",
                field("key", 1, Type::Bool),
                field("value", 2, Type::String),
            ),
            map_entry(
                "CodesEntry",
                field("key", 1, Type::Uint64),
                typed("value", 2, Type::Enum, ".test.Color"),
            ),
            map_entry(
                "WideEntry",
                field("key", 1, Type::String),
                field("value", 2, Type::Int64),
            ),
            map_entry(
                "ShadeCodesEntry",
                field("key", 1, Type::Uint64),
                typed("value", 2, Type::Enum, ".test.Shade"),
            ),
            map_entry(
                "TByIdEntry",
                field("key", 1, Type::Int32),
                typed("value", 2, Type::Message, ".test.T"),
            ),
        ],
        oneof_decl: vec![oneof("_opt")],
        ..Default::default()
    };

    let t = DescriptorProto {
        name: Some("T".to_string()),
        field: vec![
            field("name", 1, Type::String),
            repeated(field("tags", 2, Type::String)),
            map_field("meta", 3, ".test.T.MetaEntry"),
        ],
        nested_type: vec![map_entry(
            "MetaEntry",
            field("key", 1, Type::String),
            field("value", 2, Type::Int32),
        )],
        ..Default::default()
    };

    FileDescriptorProto {
        name: Some("test.proto".to_string()),
        package: Some("test".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![inner, scalars, t],
        enum_type: vec![color, shade],
        ..Default::default()
    }
}

fn other_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("other.proto".to_string()),
        package: Some("other".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![DescriptorProto {
            name: Some("Inner".to_string()),
            field: vec![field("label", 1, Type::String)],
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn dynamic_file() -> FileDescriptorProto {
    FileDescriptorProto {
        name: Some("dynamic.proto".to_string()),
        package: Some("dynamic".to_string()),
        syntax: Some("proto3".to_string()),
        message_type: vec![DescriptorProto {
            name: Some("Only".to_string()),
            field: vec![field("note", 1, Type::String)],
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// Descriptor set for the registry used by tests.
pub fn descriptor_set() -> FileDescriptorSet {
    FileDescriptorSet {
        file: vec![test_file(), other_file()],
    }
}

/// The registry used by tests.
pub fn pool() -> DescriptorPool {
    DescriptorPool::from_file_descriptor_set(descriptor_set()).expect("valid test schema")
}

/// A second registry holding `dynamic.Only`, unknown to `pool()`, and its own
/// copy of `test.*`.
pub fn dynamic_pool() -> DescriptorPool {
    DescriptorPool::from_file_descriptor_set(FileDescriptorSet {
        file: vec![test_file(), dynamic_file()],
    })
    .expect("valid dynamic schema")
}
