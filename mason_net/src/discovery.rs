// Local address discovery: which of this machine's IPv4 addresses are
// worth handing to another player.
//
// The filter keeps the RFC 1918 private ranges plus 26/8 and 27/8, which
// the popular gaming VPNs hand out. Loopback and the unspecified address
// are never useful to a remote peer.

use std::net::Ipv4Addr;

/// Whether an address is reachable by a LAN or gaming-VPN peer.
pub fn is_lan_address(addr: Ipv4Addr) -> bool {
    let [a, b, _, _] = addr.octets();
    match a {
        10 | 26 | 27 => true,
        172 => (16..=31).contains(&b),
        192 => b == 168,
        _ => false,
    }
}

/// Enumerate this host's shareable IPv4 addresses as `"ip (iface)"` lines,
/// filtered through `is_lan_address`. Returns an empty list when the
/// platform offers no enumeration or it fails.
#[cfg(unix)]
pub fn local_addresses() -> Vec<String> {
    let mut found = Vec::new();
    let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();
    // Safety: getifaddrs fills a linked list we walk read-only and free
    // exactly once with freeifaddrs.
    unsafe {
        if libc::getifaddrs(&mut ifaddrs) != 0 {
            return found;
        }
        let mut current = ifaddrs;
        while !current.is_null() {
            let entry = &*current;
            current = entry.ifa_next;

            if entry.ifa_addr.is_null() {
                continue;
            }
            if i32::from((*entry.ifa_addr).sa_family) != libc::AF_INET {
                continue;
            }
            let sockaddr = &*entry.ifa_addr.cast::<libc::sockaddr_in>();
            let addr = Ipv4Addr::from(u32::from_be(sockaddr.sin_addr.s_addr));
            if !is_lan_address(addr) {
                continue;
            }
            let name = std::ffi::CStr::from_ptr(entry.ifa_name)
                .to_string_lossy()
                .into_owned();
            found.push(format!("{addr} ({name})"));
        }
        libc::freeifaddrs(ifaddrs);
    }
    found
}

#[cfg(not(unix))]
pub fn local_addresses() -> Vec<String> {
    Vec::new()
}
