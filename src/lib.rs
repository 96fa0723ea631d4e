pub mod bench;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod host;
pub mod interpreter;
pub mod loops;
pub mod source;
pub mod tape;

pub use config::Config;
pub use control::PauseToken;
pub use engine::Status;
pub use error::{Error, ErrorKind, Result};
pub use host::{Chunk, Host, SliceSource};
pub use interpreter::{Interpreter, State};
pub use source::FileSource;
pub use tape::Tape;
