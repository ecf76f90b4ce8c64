// ABOUTME: Version and REPL banner constants

pub const VERSION: &str = "0.1.0";
pub const WELCOME_MESSAGE: &str = "Orla v0.1";
pub const WELCOME_SUBTITLE: &str = "A tree-walking interpreter; Ctrl-D exits";
pub const PROMPT: &str = "orla> ";
pub const HISTORY_FILE: &str = ".orla_history";
