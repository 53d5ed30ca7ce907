use anyhow::Context;
use lab_network::backend::in_memory::InMemoryBackend;
use lab_network::backend::netns::{CommandRunner, NamespaceBackend};
use lab_network::{EmulationBackend, EmulationSession};
use std::io::{BufRead, Write};
use std::net::Ipv4Addr;

const PROMPT: &str = "router-lab> ";

const HELP: &str = "\
Commands:
  help                 show this message
  nodes                list every node and its addresses
  routes [NODE]        print the routing table of NODE (all routers by default)
  exec NODE CMD...     run CMD on NODE and print its output
  path HOST IP         show the path a packet from HOST to IP would take
  exit | quit          tear the emulation down and leave
";

/// Backend capabilities the shell uses beyond [`EmulationBackend`]
pub trait ShellBackend: EmulationBackend {
    /// Follows the routing tables from `from` towards `destination`, when the backend can
    fn trace(&self, _from: &str, _destination: Ipv4Addr) -> Option<Result<Vec<String>, String>> {
        None
    }
}

impl ShellBackend for InMemoryBackend {
    fn trace(&self, from: &str, destination: Ipv4Addr) -> Option<Result<Vec<String>, String>> {
        Some(InMemoryBackend::trace(self, from, destination).map_err(|e| e.to_string()))
    }
}

impl<R: CommandRunner> ShellBackend for NamespaceBackend<R> {}

/// Reads commands from `input` until `exit`, `quit` or end of input
///
/// Failing commands are reported on `output` and never end the shell.
pub fn run_shell<B: ShellBackend>(
    session: &mut EmulationSession<B>,
    mut input: impl BufRead,
    mut output: impl Write,
) -> anyhow::Result<()> {
    writeln!(output, "Type `help` for a list of commands")?;

    let mut line = String::new();
    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        line.clear();
        let read = input
            .read_line(&mut line)
            .context("failed to read from the shell's input")?;
        if read == 0 {
            writeln!(output)?;
            break;
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["exit" | "quit"] => break,
            ["help"] => write!(output, "{HELP}")?,
            ["nodes"] => print_nodes(session, &mut output)?,
            ["routes"] => {
                for router in session.routers().to_vec() {
                    print_routes(session, &router, &mut output)?;
                }
            }
            ["routes", node] => print_routes(session, node, &mut output)?,
            ["exec", node, command @ ..] if !command.is_empty() => {
                match session.execute(node, &command.join(" ")) {
                    Ok(result) => write!(output, "{result}")?,
                    Err(e) => writeln!(output, "error: {e}")?,
                }
            }
            ["path", from, destination] => print_path(session, from, destination, &mut output)?,
            [command, ..] => writeln!(
                output,
                "error: unknown or malformed command `{command}` \
                 (type `help` for a list of commands)"
            )?,
        }
    }

    Ok(())
}

fn print_nodes<B: ShellBackend>(
    session: &EmulationSession<B>,
    output: &mut impl Write,
) -> anyhow::Result<()> {
    for node in session.topology().nodes() {
        let addresses: Vec<_> = node
            .interfaces
            .iter()
            .map(|i| format!("{} {}", i.name, i.address))
            .collect();
        if addresses.is_empty() {
            writeln!(output, "* {} ({})", node.id, node.kind)?;
        } else {
            writeln!(output, "* {} ({}): {}", node.id, node.kind, addresses.join(", "))?;
        }
    }

    Ok(())
}

fn print_routes<B: ShellBackend>(
    session: &mut EmulationSession<B>,
    node: &str,
    output: &mut impl Write,
) -> anyhow::Result<()> {
    match session.execute(node, "ip route") {
        Ok(table) => {
            writeln!(output, "* {node}")?;
            for line in table.lines() {
                writeln!(output, "  | {line}")?;
            }
        }
        Err(e) => writeln!(output, "error: {e}")?,
    }

    Ok(())
}

fn print_path<B: ShellBackend>(
    session: &EmulationSession<B>,
    from: &str,
    destination: &str,
    output: &mut impl Write,
) -> anyhow::Result<()> {
    let destination: Ipv4Addr = match destination.parse() {
        Ok(destination) => destination,
        Err(_) => {
            writeln!(output, "error: `{destination}` is not an IPv4 address")?;
            return Ok(());
        }
    };

    match session.backend().trace(from, destination) {
        Some(Ok(path)) => writeln!(output, "{}", path.join(" -> "))?,
        Some(Err(e)) => writeln!(output, "error: {e}")?,
        None => writeln!(
            output,
            "error: the {} backend cannot trace packets",
            session.backend().name()
        )?,
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use lab_network::routing::derive::derive_routes;
    use lab_network::routing::facts::RoutingFacts;
    use lab_network::topology::triangle::triangle;

    fn run_script(script: &str) -> String {
        let topology = triangle().unwrap();
        let mut session = EmulationSession::start(InMemoryBackend::new(), &topology).unwrap();
        let plan = derive_routes(&RoutingFacts::from_topology(&topology).unwrap()).unwrap();
        session.install_routes(&plan).unwrap();

        let mut output = Vec::new();
        run_shell(&mut session, script.as_bytes(), &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_path_and_exit() {
        let output = run_script("path H1 10.0.2.1\nexit\nnodes\n");

        assert!(output.contains("H1 -> R1 -> R2 -> H3\n"));
        // Nothing runs after `exit`
        assert!(!output.contains("(router)"));
    }

    #[test]
    fn test_routes_of_a_single_router() {
        let output = run_script("routes R2\n");

        assert!(output.contains("* R2\n"));
        assert!(output.contains("  | 10.0.1.0/24 via 10.0.4.1\n"));
        assert!(output.contains("  | 10.0.3.0/24 via 10.0.5.2\n"));
        assert!(!output.contains("* R1\n"));
    }

    #[test]
    fn test_exec_on_a_node() {
        let output = run_script("exec R3 sysctl net.ipv4.ip_forward\n");
        assert!(output.contains("net.ipv4.ip_forward = 1\n"));
    }

    #[test]
    fn test_errors_keep_the_shell_alive() {
        let output = run_script("frobnicate\nexec S1 ip route\npath H1 nowhere\nquit\n");

        assert!(output.contains("error: unknown or malformed command `frobnicate`"));
        assert!(output.contains("error: `ip route` failed on `S1`: switches cannot be configured"));
        assert!(output.contains("error: `nowhere` is not an IPv4 address"));
        // One prompt per line read
        assert_eq!(output.matches(PROMPT).count(), 4);
    }

    #[test]
    fn test_nodes_lists_addresses() {
        let output = run_script("nodes\n");
        assert!(output.contains(
            "* R1 (router): R1-eth1 10.0.1.254/24, R1-eth2 10.0.4.1/24, R1-eth3 10.0.6.1/24\n"
        ));
        assert!(output.contains("* S4 (switch)\n"));
        assert!(output.contains("* H2 (host): H2-eth0 10.0.1.2/24\n"));
    }
}
