//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                               |
//! |------|-------------------------------------------------------|
//! | 0    | Success                                               |
//! | 1    | Script error (syntax error, runtime error, proto error) |
//! | 2    | Usage error (bad arguments)                           |
//! | 3    | I/O error (script or descriptor set unreadable)       |
//! | 4    | Descriptor set invalid                                |
//! | 5    | Config invalid                                        |
//! | 6    | Limit exceeded (instructions, timeout, memory)        |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// The script failed: syntax error, Lua runtime error, or a proxy error
/// raised inside the script.
pub const EXIT_SCRIPT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
/// clap uses the same code for argument parse failures.
pub const EXIT_USAGE: u8 = 2;

/// A script or descriptor set file could not be read.
pub const EXIT_IO: u8 = 3;

/// A descriptor set is not a valid serialized FileDescriptorSet, or its
/// files do not link (missing imports, duplicate names).
pub const EXIT_DESCRIPTOR_INVALID: u8 = 4;

/// The settings file could not be parsed or failed validation.
pub const EXIT_CONFIG_INVALID: u8 = 5;

/// The runtime stopped the script: instruction limit, wall-clock timeout,
/// or Lua heap cap.
pub const EXIT_LIMIT_EXCEEDED: u8 = 6;
