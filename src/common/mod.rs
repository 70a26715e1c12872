pub const MIN_ENCRYPT_KEY_LENGTH: usize = 8;

pub const CAPABILITY_DEADLINE_SECS: u64 = 30;

pub const MAX_CAPABILITY_OUTPUT_BYTES: usize = 50 * 1024 * 1024;

pub const MAX_CAPABILITY_DIAGNOSTIC_BYTES: usize = 256 * 1024;

pub const RECENT_RECORDS_WINDOW: usize = 100;

pub const MAX_STAGED_NAME_LENGTH: usize = 80;

pub const WRONG_KEY_HINT: &'static str =
    "Check that the key matches the one used during encryption";
