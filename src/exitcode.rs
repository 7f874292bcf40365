//! Process exit codes, following BSD `sysexits.h`.

pub const OK: i32 = 0;

/// Bad flags or refused operation (existing config without `--force`)
pub const USAGE: i32 = 64;

/// Malformed CIDR, registry row or delegation record
pub const DATAERR: i32 = 65;

/// An input dataset is missing
pub const NOINPUT: i32 = 66;

/// The route script could not be written
pub const CANTCREAT: i32 = 73;

pub const IOERR: i32 = 74;

/// Unreadable or invalid config file or NONCN_* variable
pub const CONFIG: i32 = 78;
