// mason-console — headless console for a Mason multiplayer session.
//
// Runs the full session stack without the game client: host a session or
// join one, then drive it from a line-based prompt using the same command
// registry the in-game console uses. Useful for dedicated hosting and for
// poking at a live session.
//
// Usage:
//   mason-console
// then type `help` at the prompt. `quit` exits.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mason_net::{CommandContext, CommandRegistry, Console, Replicator, Session, SessionDriver, World};
use mason_protocol::Vec3;

/// Fixed tick for the background driver thread. Coarse is fine here: the
/// console has no moving player, it just keeps the keepalive and position
/// heartbeat flowing.
const TICK: Duration = Duration::from_millis(100);

/// Where the console "stands" in the world.
const SPAWN: Vec3 = Vec3 {
    x: 0.0,
    y: 1.6,
    z: 0.0,
};

fn main() {
    tracing_subscriber::fmt::init();

    let world = World::new();
    let console = Console::new();
    let replicator = Replicator::new(world.clone(), console.clone());
    let session = Session::new();
    replicator.install(&session);

    let running = Arc::new(AtomicBool::new(true));
    let driver_thread = {
        let mut driver = SessionDriver::new(session.clone(), Arc::clone(&replicator));
        let running = Arc::clone(&running);
        std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                driver.tick(TICK.as_secs_f32(), SPAWN);
                std::thread::sleep(TICK);
            }
        })
    };

    let context = CommandContext {
        session: session.clone(),
        world,
        console: console.clone(),
        replicator,
    };
    let registry = CommandRegistry::with_builtins();

    println!("mason-console (type 'help' for commands, 'quit' to exit)");
    let stdin = std::io::stdin();
    let mut cursor = 0u64;
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                eprintln!("stdin error: {err}");
                break;
            }
        }
        let line = line.trim();
        if line == "quit" || line == "exit" {
            break;
        }
        registry.dispatch(&context, line);

        // Print only what the command (and any concurrent session traffic)
        // appended since the last prompt.
        let (lines, next) = console.since(cursor);
        cursor = next;
        for line in lines {
            println!("{line}");
        }
    }

    running.store(false, Ordering::SeqCst);
    let _ = driver_thread.join();
    session.disconnect();
    println!("bye");
}
