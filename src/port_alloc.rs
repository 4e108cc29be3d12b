//! Port selection for long-running component processes: ephemeral probing
//! upward from a start port, or a deterministic start port in stable mode.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_millis(200);
const MAX_PROBES: u16 = 1000;

/// Probe upward from `start`, returning the first port nobody is listening
/// on (connect-refused, or connect-timeout, counts as free).
pub fn find_free_port(start: u16) -> anyhow::Result<u16> {
    let mut port = start;
    for _ in 0..MAX_PROBES {
        if is_free(port) {
            return Ok(port);
        }
        port = port.checked_add(1).ok_or_else(|| anyhow::anyhow!("exhausted port range from {start}"))?;
    }
    anyhow::bail!("no free port found in {MAX_PROBES} probes starting at {start}")
}

fn is_free(port: u16) -> bool {
    let addr = ("127.0.0.1", port);
    let Ok(mut addrs) = addr.to_socket_addrs() else { return false };
    let Some(addr) = addrs.next() else { return false };
    match TcpStream::connect_timeout(&addr, PROBE_TIMEOUT) {
        Ok(_) => false,
        Err(_) => true,
    }
}

/// Deterministic start port for stable mode: derived from the stack name so
/// the same stack always gets the same port absent contention.
pub fn stable_start_port(stack_name: &str) -> u16 {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    stack_name.hash(&mut hasher);
    let hash = hasher.finish();

    const RANGE_START: u16 = 20000;
    const RANGE_SIZE: u16 = 10000;
    RANGE_START + (hash % RANGE_SIZE as u64) as u16
}
