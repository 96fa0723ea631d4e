/// Settings fixed when an interpreter is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Instruction byte that marks the end of the program.
    pub eof: u8,
    /// Moving past either end of the tape jumps to the opposite end.
    /// When disabled the data pointer stays at the boundary.
    pub wrap_data_pointer: bool,
    /// Request the next chunk from the host when the current one runs out,
    /// instead of returning control to the caller.
    pub continuous: bool,
    /// Number of bracket pairs the loop table can hold. This bounds the
    /// total count of `[` in the program, not the nesting depth.
    pub max_loops: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            eof: 0,
            wrap_data_pointer: false,
            continuous: true,
            max_loops: 256,
        }
    }
}
