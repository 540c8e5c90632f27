// Console command registry. Commands are plain functions over a shared
// context; output goes to the in-game console buffer, never to stdout, so
// the same registry serves the windowed console and the headless binary.

use std::collections::BTreeMap;
use std::sync::Arc;

use mason_protocol::{Message, encode};

use crate::console::Console;
use crate::discovery;
use crate::replication::Replicator;
use crate::session::{DEFAULT_PORT, Session};
use crate::world::World;

/// Everything a command may touch.
pub struct CommandContext {
    pub session: Session,
    pub world: World,
    pub console: Console,
    pub replicator: Arc<Replicator>,
}

type CommandFn = fn(&CommandContext, &[&str]);

pub struct CommandRegistry {
    commands: BTreeMap<&'static str, CommandFn>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl CommandRegistry {
    pub fn empty() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("host", cmd_host);
        registry.register("connect", cmd_connect);
        registry.register("disconnect", cmd_disconnect);
        registry.register("players", cmd_players);
        registry.register("ip", cmd_ip);
        registry.register("netdebug", cmd_netdebug);
        registry.register("cls", cmd_cls);
        registry.register("sync", cmd_sync);
        registry
    }

    pub fn register(&mut self, name: &'static str, command: CommandFn) {
        self.commands.insert(name, command);
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    /// Parse and run one console line. Empty input is ignored; `help` is
    /// answered from the registry itself so it always lists every command.
    pub fn dispatch(&self, context: &CommandContext, line: &str) {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else { return };
        let args: Vec<&str> = parts.collect();

        if name == "help" {
            let names: Vec<&str> = self.names().collect();
            context
                .console
                .push(format!("Commands: help, {}", names.join(", ")));
            return;
        }
        match self.commands.get(name) {
            Some(command) => command(context, &args),
            None => context
                .console
                .push(format!("Unknown command {name:?} (try: help)")),
        }
    }
}

fn parse_port(args: &[&str], index: usize) -> Result<u16, String> {
    match args.get(index) {
        None => Ok(DEFAULT_PORT),
        Some(text) => text
            .parse()
            .map_err(|_| format!("Invalid port {text:?}")),
    }
}

fn cmd_host(context: &CommandContext, args: &[&str]) {
    let port = match parse_port(args, 0) {
        Ok(port) => port,
        Err(message) => return context.console.push(message),
    };
    context.replicator.reset();
    context.world.clear_players();
    match context.session.start_host(port) {
        Ok(addr) => {
            context
                .console
                .push(format!("Hosting on port {}", addr.port()));
            for line in discovery::local_addresses() {
                context.console.push(format!("  reachable at {line}"));
            }
        }
        Err(err) => context.console.push(format!("Could not host: {err}")),
    }
}

fn cmd_connect(context: &CommandContext, args: &[&str]) {
    let Some(ip) = args.first() else {
        return context.console.push("Usage: connect <ip> [port]");
    };
    let port = match parse_port(args, 1) {
        Ok(port) => port,
        Err(message) => return context.console.push(message),
    };
    // Clear session-scoped state before the receive loop exists: once
    // connect returns, the host's ASSIGN_ID can land on the receive thread
    // at any moment, and a reset after that would erase it for good.
    context.replicator.reset();
    context.world.clear_players();
    match context.session.connect(ip, port) {
        Ok(()) => {
            context.console.push(format!("Connected to {ip}:{port}"));
        }
        Err(err) => {
            context
                .console
                .push(format!("Could not connect to {ip}:{port}: {err}"));
            context.console.push("Check that:");
            context
                .console
                .push("  - the host has run 'host' and shared the right address");
            context
                .console
                .push("  - you are on the same LAN or VPN network");
            context
                .console
                .push("  - no firewall is blocking the port");
        }
    }
}

fn cmd_disconnect(context: &CommandContext, _args: &[&str]) {
    // Tell the host we are leaving before the socket drops, so the roster
    // update rides LEAVE instead of a disconnect detection.
    if context.session.is_client() {
        context.session.send(encode(&Message::Leave).as_bytes());
    }
    context.session.disconnect();
    context.world.clear_players();
    context.replicator.reset();
    context.console.push("Disconnected from multiplayer");
}

fn cmd_players(context: &CommandContext, _args: &[&str]) {
    let players = context.world.players();
    context
        .console
        .push(format!("{} player(s) known:", players.len()));
    for player in players {
        let p = player.position;
        context.console.push(format!(
            "  {} at {:.1},{:.1},{:.1}",
            player.name, p.x, p.y, p.z
        ));
    }
}

fn cmd_ip(context: &CommandContext, _args: &[&str]) {
    let addresses = discovery::local_addresses();
    if addresses.is_empty() {
        context
            .console
            .push("No shareable LAN/VPN address found");
    } else {
        context.console.push("Share one of these with players:");
        for line in addresses {
            context.console.push(format!("  {line}"));
        }
    }
    context
        .console
        .push("Over the internet, use a VPN such as Radmin or Hamachi");
}

fn cmd_netdebug(context: &CommandContext, _args: &[&str]) {
    context
        .console
        .push(format!("role: {}", context.session.role()));
    context.console.push(format!(
        "connections: {}",
        context.session.connection_count()
    ));
    context
        .console
        .push(format!("players: {}", context.world.player_count()));
    context
        .console
        .push(format!("blocks: {}", context.world.block_count()));
    if let Some(id) = context.replicator.local_id() {
        context.console.push(format!("local id: {}", id.0));
    }
}

fn cmd_cls(context: &CommandContext, _args: &[&str]) {
    context.console.clear();
}

fn cmd_sync(context: &CommandContext, _args: &[&str]) {
    if !context.session.is_host() {
        return context.console.push("Only the host can sync");
    }
    context.replicator.resync_clients(&context.session);
    context.console.push(format!(
        "Re-sent {} block(s) to all clients",
        context.world.block_count()
    ));
}
