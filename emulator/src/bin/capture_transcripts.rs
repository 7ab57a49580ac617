//! Replays a canned console exchange and prints the responses.
//!
//! Handy for capturing evidence of the attached-mode behavior without an
//! interactive session: streaming on and off, a rate change, the battery
//! latch, and the deferred restart.

#[path = "../session.rs"]
mod session;

use std::io;

use session::Session;

const SCRIPT: &[&str] = &[
    "status",
    "rate 200",
    "stream",
    "!advance 64",
    "stream off",
    "!battery 760",
    "!seconds 3",
    "battery",
    "reset 1",
    "!seconds 2",
];

fn main() -> io::Result<()> {
    let mut session = Session::new(false, None)?;

    for line in SCRIPT {
        println!("> {line}");
        for response in session.handle_input(line)? {
            println!("{response}");
        }
    }

    Ok(())
}
