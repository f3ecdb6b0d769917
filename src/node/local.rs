//! Local address detection
//!
//! An address is local when it appears in the operator-maintained address
//! list file (`<ip>/<mask>` per line) or, when no list file can be read, when
//! it is bound to one of the host's network interfaces.

use std::fs;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Source of the addresses currently bound to host interfaces.
pub trait InterfaceAddrs: Send + Sync {
    fn addresses(&self) -> io::Result<Vec<IpAddr>>;
}

/// Live interface enumeration through `getifaddrs(3)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterfaces;

impl InterfaceAddrs for SystemInterfaces {
    #[cfg(target_os = "linux")]
    fn addresses(&self) -> io::Result<Vec<IpAddr>> {
        sys::interface_addresses()
    }

    #[cfg(not(target_os = "linux"))]
    fn addresses(&self) -> io::Result<Vec<IpAddr>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "interface enumeration is only supported on Linux",
        ))
    }
}

/// A fixed set of interface addresses.
#[derive(Debug, Default, Clone)]
pub struct StaticInterfaces(pub Vec<IpAddr>);

impl InterfaceAddrs for StaticInterfaces {
    fn addresses(&self) -> io::Result<Vec<IpAddr>> {
        Ok(self.0.clone())
    }
}

/// Which source answered a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    ListFile,
    Interfaces,
}

impl LookupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupSource::ListFile => "list_file",
            LookupSource::Interfaces => "interfaces",
        }
    }
}

/// Outcome of reading the address list file.
#[derive(Debug)]
pub enum AddressList {
    /// File was read; its contents are authoritative.
    Loaded(Vec<u8>),
    /// No path configured.
    NotConfigured,
    /// Path configured but the file does not exist.
    Missing,
    /// File exists but could not be read.
    Unreadable(io::Error),
}

impl AddressList {
    pub fn read(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => return AddressList::NotConfigured,
        };

        match fs::read(path) {
            Ok(contents) => AddressList::Loaded(contents),
            Err(e) if e.kind() == io::ErrorKind::NotFound => AddressList::Missing,
            Err(e) => AddressList::Unreadable(e),
        }
    }
}

/// True when some line of `contents` is `<candidate>/<mask>`.
///
/// Lines are compared as raw bytes; the file need not be valid UTF-8.
pub fn list_contains(contents: &[u8], candidate: &str) -> bool {
    contents.split(|b| *b == b'\n').any(|line| {
        line.strip_prefix(candidate.as_bytes())
            .is_some_and(|rest| rest.starts_with(b"/"))
    })
}

/// Resolves whether addresses belong to this host.
pub struct LocalAddressResolver<I = SystemInterfaces> {
    list_file: Option<PathBuf>,
    interfaces: I,
}

impl LocalAddressResolver<SystemInterfaces> {
    pub fn new(list_file: Option<PathBuf>) -> Self {
        Self::with_interfaces(list_file, SystemInterfaces)
    }
}

impl<I: InterfaceAddrs> LocalAddressResolver<I> {
    pub fn with_interfaces(list_file: Option<PathBuf>, interfaces: I) -> Self {
        Self {
            list_file,
            interfaces,
        }
    }

    pub fn list_file(&self) -> Option<&Path> {
        self.list_file.as_deref()
    }

    pub fn is_local(&self, candidate: &str) -> bool {
        self.lookup(candidate).0
    }

    /// Like [`is_local`](Self::is_local), also reporting which source answered.
    pub fn lookup(&self, candidate: &str) -> (bool, LookupSource) {
        match AddressList::read(self.list_file()) {
            AddressList::Loaded(contents) => {
                return (list_contains(&contents, candidate), LookupSource::ListFile);
            }
            AddressList::NotConfigured => {}
            AddressList::Missing => {
                debug!(
                    "Address list file {} not found, fetching addresses from interfaces",
                    self.display_list_file()
                );
            }
            AddressList::Unreadable(e) => {
                warn!(
                    "Failed to read address list file {}: {}. Falling back to interfaces",
                    self.display_list_file(),
                    e
                );
            }
        }

        (self.bound_to_interface(candidate), LookupSource::Interfaces)
    }

    fn bound_to_interface(&self, candidate: &str) -> bool {
        match self.interfaces.addresses() {
            Ok(addrs) => addrs.iter().any(|addr| addr.to_string() == candidate),
            Err(e) => {
                warn!("Failed to enumerate interface addresses: {}", e);
                false
            }
        }
    }

    fn display_list_file(&self) -> String {
        self.list_file
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }
}

/// Check `candidate` against `list_file`, falling back to live interfaces.
pub fn is_local_address(candidate: &str, list_file: Option<&Path>) -> bool {
    LocalAddressResolver::new(list_file.map(Path::to_path_buf)).is_local(candidate)
}

#[cfg(target_os = "linux")]
mod sys {
    use std::io;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    pub fn interface_addresses() -> io::Result<Vec<IpAddr>> {
        let mut head: *mut libc::ifaddrs = std::ptr::null_mut();

        // SAFETY: getifaddrs writes a list head we free below.
        if unsafe { libc::getifaddrs(&mut head) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut addrs = Vec::new();
        let mut cursor = head;
        while !cursor.is_null() {
            // SAFETY: cursor is a non-null node of the list returned above.
            let entry = unsafe { &*cursor };
            if let Some(addr) = unsafe { decode_sockaddr(entry.ifa_addr) } {
                addrs.push(addr);
            }
            cursor = entry.ifa_next;
        }

        // SAFETY: head came from getifaddrs and is freed exactly once.
        unsafe { libc::freeifaddrs(head) };

        Ok(addrs)
    }

    /// # Safety
    ///
    /// `sa` must be null or point to a sockaddr sized for its family.
    unsafe fn decode_sockaddr(sa: *const libc::sockaddr) -> Option<IpAddr> {
        if sa.is_null() {
            return None;
        }

        match i32::from((*sa).sa_family) {
            libc::AF_INET => {
                let sin = &*(sa as *const libc::sockaddr_in);
                // s_addr holds the octets in network order
                let octets = sin.sin_addr.s_addr.to_ne_bytes();
                Some(IpAddr::V4(Ipv4Addr::from(octets)))
            }
            libc::AF_INET6 => {
                let sin6 = &*(sa as *const libc::sockaddr_in6);
                Some(IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr)))
            }
            _ => None,
        }
    }
}
