// ABOUTME: Best-effort TCP port allocation by probing the OS.
// ABOUTME: A free port here is a hint; container start is the authoritative check.

use std::net::{Ipv4Addr, TcpListener};

/// Lowest port handed out; privileged ports are skipped.
pub const MIN_PORT: u16 = 1024;

/// Default probe budget for a single lookup.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Whether nothing is currently bound to `port` on any interface.
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
}

/// Probe ports linearly from `start` and return the first free one.
///
/// Values outside `[1024, 65535]` are skipped but still consume an attempt.
/// Returns `None` once `max_attempts` candidates have been tried. The result
/// can race with other processes binding the same port.
pub fn find_available_port(start: u16, max_attempts: u32) -> Option<u16> {
    find_available_port_with(start, max_attempts, is_port_available)
}

/// Collect up to `count` free ports, starting at `base` and advancing by
/// `spacing` past each port found.
///
/// May return fewer than `count` ports; callers must check the length.
pub fn find_available_ports(base: u16, count: usize, spacing: u16) -> Vec<u16> {
    find_available_ports_with(base, count, spacing, is_port_available)
}

fn find_available_port_with(
    start: u16,
    max_attempts: u32,
    available: impl Fn(u16) -> bool,
) -> Option<u16> {
    (0..max_attempts)
        .map(|offset| u32::from(start) + offset)
        .take_while(|candidate| *candidate <= u32::from(u16::MAX))
        .filter_map(|candidate| u16::try_from(candidate).ok())
        .filter(|candidate| *candidate >= MIN_PORT)
        .find(|candidate| available(*candidate))
}

fn find_available_ports_with(
    base: u16,
    count: usize,
    spacing: u16,
    available: impl Fn(u16) -> bool,
) -> Vec<u16> {
    let step = u32::from(spacing.max(1));
    let mut ports = Vec::with_capacity(count);
    let mut next = u32::from(base);

    while ports.len() < count {
        let Ok(start) = u16::try_from(next) else {
            break;
        };
        let Some(port) = find_available_port_with(start, DEFAULT_MAX_ATTEMPTS, &available) else {
            break;
        };
        ports.push(port);
        next = u32::from(port) + step;
    }

    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_privileged_ports() {
        let port = find_available_port_with(1000, 100, |_| true);
        assert_eq!(port, Some(1024));
    }

    #[test]
    fn returns_first_free_candidate() {
        let port = find_available_port_with(5000, 100, |p| p >= 5003);
        assert_eq!(port, Some(5003));
    }

    #[test]
    fn gives_up_after_budget() {
        assert_eq!(find_available_port_with(5000, 10, |p| p >= 5010), None);
    }

    #[test]
    fn stops_at_top_of_range() {
        assert_eq!(find_available_port_with(65530, 100, |_| false), None);
        assert_eq!(find_available_port_with(65535, 100, |_| true), Some(65535));
    }

    #[test]
    fn ports_advance_by_spacing() {
        let ports = find_available_ports_with(6000, 3, 10, |_| true);
        assert_eq!(ports, vec![6000, 6010, 6020]);
    }

    #[test]
    fn ports_may_come_up_short() {
        let ports = find_available_ports_with(65520, 5, 10, |_| true);
        assert_eq!(ports, vec![65520, 65530]);
    }

    #[test]
    fn bound_port_is_reported_busy() {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!is_port_available(port));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn found_port_is_in_range_and_within_budget(
                start in any::<u16>(),
                attempts in 1u32..200,
                threshold in any::<u16>(),
            ) {
                if let Some(port) = find_available_port_with(start, attempts, |p| p >= threshold) {
                    prop_assert!(port >= MIN_PORT);
                    prop_assert!(port >= threshold);
                    prop_assert!(port >= start);
                    prop_assert!(u32::from(port) < u32::from(start) + attempts);
                }
            }

            #[test]
            fn ports_are_spaced_and_bounded(
                base in any::<u16>(),
                count in 0usize..8,
                spacing in 1u16..50,
            ) {
                let ports = find_available_ports_with(base, count, spacing, |_| true);
                prop_assert!(ports.len() <= count);
                for pair in ports.windows(2) {
                    prop_assert!(pair[1] - pair[0] >= spacing);
                }
            }
        }
    }
}
