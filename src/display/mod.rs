// src/display/mod.rs
//! Display modules for different interfaces

pub mod terminal;

/// Check if the terminal view can be drawn on stdout
pub fn is_interactive() -> bool {
    use std::io::IsTerminal;
    std::io::stdout().is_terminal()
}
