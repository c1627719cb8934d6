//! Entry point for the `godi` binary: delegates straight to `godi-cli`.

use std::process::ExitCode;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> ExitCode {
    let code = godi_cli::run(std::env::args_os());
    ExitCode::from(code.as_i32() as u8)
}
