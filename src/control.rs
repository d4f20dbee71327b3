//! Terminal control surface, ported from
//! `pkg/interface/desktop/desktop.go`. Runs on a blocking thread since
//! stdin reads block; toggles `Capture`/`Playback`'s `paused` flags
//! directly.

use std::io::BufRead;
use std::sync::Arc;

use crate::audio::{Capture, Playback};

const MENU: &str = "1. Unmute\n2. Mute\n3. Play sound\n4. Stop sound\n5. Exit";

/// Blocks the calling thread reading numbered commands from stdin
/// until the user chooses "Exit" or stdin closes.
pub fn run(capture: Arc<Capture>, playback: Arc<Playback>) {
    println!("Desktop Interface Started\nBy default you are muted and sound is on");
    println!("Menu:");
    println!("{MENU}");

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("Enter choice: ");
        use std::io::Write;
        let _ = std::io::stdout().flush();

        let Some(Ok(line)) = lines.next() else {
            println!("stdin closed, exiting control surface");
            return;
        };

        match line.trim() {
            "1" => {
                println!("Unmuted");
                capture.set_paused(false);
            }
            "2" => {
                println!("Muted");
                capture.set_paused(true);
            }
            "3" => {
                println!("Playing sound");
                playback.set_paused(false);
            }
            "4" => {
                println!("Stopping sound");
                playback.set_paused(true);
            }
            "5" => {
                println!("Exiting...");
                return;
            }
            _ => println!("Invalid choice, please try again."),
        }
    }
}
