//! Node identity: is an address ours, and how does it look as a map key

pub mod address;
pub mod cache;
pub mod local;

pub use address::{pack_ipv4, unpack_ipv4};
pub use cache::CachedResolver;
pub use local::{
    is_local_address, InterfaceAddrs, LocalAddressResolver, StaticInterfaces, SystemInterfaces,
};
