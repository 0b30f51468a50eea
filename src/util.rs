use std::net::{IpAddr, Ipv4Addr};

const HUB_PORT: &str = "CANOPY_HUB_PORT";

pub const DEFAULT_HUB_PORT: u16 = 51244;

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(HUB_PORT);
    port_from_env.map_or(DEFAULT_HUB_PORT, |res| res.parse().unwrap_or(DEFAULT_HUB_PORT))
}

const HUB_ADDR: &str = "CANOPY_HUB_ADDR";

const DEFAULT_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0));

pub fn get_addr() -> IpAddr {
    let addr_from_env = std::env::var(HUB_ADDR);
    addr_from_env.map_or(DEFAULT_ADDR, |res| res.parse().unwrap_or(DEFAULT_ADDR))
}

const API_TOKEN: &str = "CANOPY_API_TOKEN";

/// Token from the environment, taking precedence over the config file.
pub fn get_token() -> Option<String> {
    std::env::var(API_TOKEN).ok().filter(|token| !token.is_empty())
}
