//! Value checks used in driver rule sets
//!
//! Every check takes the raw string value and returns a human readable reason
//! on failure. The rule set attaches the key name.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::OnceLock;

use ipnet::{Ipv4Net, Ipv6Net};
use mac_address::MacAddress;
use regex::Regex;

/// Longest name the kernel accepts for a network interface.
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

pub const MIN_MTU: u32 = 1280;
pub const MAX_MTU: u32 = 16384;
pub const MAX_VLAN: u16 = 4094;

fn interface_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:@-]*$").expect("interface name pattern is valid")
    })
}

fn dns_label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$")
            .expect("DNS label pattern is valid")
    })
}

pub fn interface_name(value: &str) -> Result<(), String> {
    if value.len() > MAX_INTERFACE_NAME_LEN {
        return Err(format!(
            "Interface name {:?} longer than {} characters",
            value, MAX_INTERFACE_NAME_LEN
        ));
    }
    if value == "." || value == ".." || !interface_name_regex().is_match(value) {
        return Err(format!("Invalid interface name {:?}", value));
    }
    Ok(())
}

/// Comma separated list of interface names.
pub fn interface_list(value: &str) -> Result<(), String> {
    split_list(value).try_for_each(interface_name)
}

/// Network names double as host interface names for some drivers.
pub fn network_name(value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err("Network name cannot be empty".to_string());
    }
    if value.contains('/') || value.starts_with('-') {
        return Err(format!("Invalid network name {:?}", value));
    }
    interface_name(value)
}

pub fn network_mtu(value: &str) -> Result<(), String> {
    let mtu: u32 = value
        .parse()
        .map_err(|_| format!("Invalid MTU {:?}", value))?;
    if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
        return Err(format!(
            "MTU {} out of range ({}-{})",
            mtu, MIN_MTU, MAX_MTU
        ));
    }
    Ok(())
}

pub fn network_vlan(value: &str) -> Result<(), String> {
    let vlan: u16 = value
        .parse()
        .map_err(|_| format!("Invalid VLAN ID {:?}", value))?;
    if vlan > MAX_VLAN {
        return Err(format!("VLAN ID {} out of range (0-{})", vlan, MAX_VLAN));
    }
    Ok(())
}

pub fn boolean(value: &str) -> Result<(), String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "false" | "1" | "0" | "yes" | "no" | "on" | "off" => Ok(()),
        _ => Err(format!("Invalid boolean {:?}", value)),
    }
}

/// IPv4 address with prefix, host bits allowed (gateway notation).
pub fn ipv4_cidr(value: &str) -> Result<(), String> {
    Ipv4Net::from_str(value)
        .map(|_| ())
        .map_err(|_| format!("Invalid IPv4 address in CIDR notation {:?}", value))
}

pub fn ipv6_cidr(value: &str) -> Result<(), String> {
    Ipv6Net::from_str(value)
        .map(|_| ())
        .map_err(|_| format!("Invalid IPv6 address in CIDR notation {:?}", value))
}

/// `ipv4_cidr`, or one of the keywords `none` / `auto`.
pub fn ipv4_cidr_or_keyword(value: &str) -> Result<(), String> {
    match value {
        "none" | "auto" => Ok(()),
        _ => ipv4_cidr(value),
    }
}

pub fn ipv6_cidr_or_keyword(value: &str) -> Result<(), String> {
    match value {
        "none" | "auto" => Ok(()),
        _ => ipv6_cidr(value),
    }
}

/// Comma separated list of IPv4 networks (no host bits).
pub fn ipv4_network_list(value: &str) -> Result<(), String> {
    for item in split_list(value) {
        let net = Ipv4Net::from_str(item).map_err(|_| format!("Invalid IPv4 network {:?}", item))?;
        if net.trunc() != net {
            return Err(format!("{:?} is not a network address", item));
        }
    }
    Ok(())
}

pub fn ipv6_network_list(value: &str) -> Result<(), String> {
    for item in split_list(value) {
        let net = Ipv6Net::from_str(item).map_err(|_| format!("Invalid IPv6 network {:?}", item))?;
        if net.trunc() != net {
            return Err(format!("{:?} is not a network address", item));
        }
    }
    Ok(())
}

/// Comma separated `start-end` IPv4 ranges.
pub fn ipv4_range_list(value: &str) -> Result<(), String> {
    parse_ipv4_ranges(value).map(|_| ())
}

pub fn ipv6_range_list(value: &str) -> Result<(), String> {
    parse_ranges::<Ipv6Addr>(value, "IPv6").map(|_| ())
}

pub fn parse_ipv4_ranges(value: &str) -> Result<Vec<(Ipv4Addr, Ipv4Addr)>, String> {
    parse_ranges::<Ipv4Addr>(value, "IPv4")
}

fn parse_ranges<A>(value: &str, family: &str) -> Result<Vec<(A, A)>, String>
where
    A: FromStr + PartialOrd + Copy,
{
    split_list(value)
        .map(|item| {
            let (start, end) = item
                .split_once('-')
                .ok_or_else(|| format!("Invalid {} range {:?}", family, item))?;
            let start: A = start
                .trim()
                .parse()
                .map_err(|_| format!("Invalid {} range start {:?}", family, start))?;
            let end: A = end
                .trim()
                .parse()
                .map_err(|_| format!("Invalid {} range end {:?}", family, end))?;
            if start > end {
                return Err(format!("{} range {:?} ends before it starts", family, item));
            }
            Ok((start, end))
        })
        .collect()
}

/// Comma separated list of IP addresses of either family.
pub fn address_list(value: &str) -> Result<(), String> {
    for item in split_list(value) {
        IpAddr::from_str(item).map_err(|_| format!("Invalid IP address {:?}", item))?;
    }
    Ok(())
}

pub fn ipv4_address(value: &str) -> Result<(), String> {
    Ipv4Addr::from_str(value)
        .map(|_| ())
        .map_err(|_| format!("Invalid IPv4 address {:?}", value))
}

pub fn mac_address(value: &str) -> Result<(), String> {
    MacAddress::from_str(value)
        .map(|_| ())
        .map_err(|_| format!("Invalid MAC address {:?}", value))
}

pub fn dns_domain(value: &str) -> Result<(), String> {
    let trimmed = value.strip_suffix('.').unwrap_or(value);
    if trimmed.is_empty() || trimmed.len() > 253 {
        return Err(format!("Invalid DNS domain {:?}", value));
    }
    for label in trimmed.split('.') {
        if !dns_label_regex().is_match(label) {
            return Err(format!("Invalid DNS domain {:?}", value));
        }
    }
    Ok(())
}

/// Value must be one of `choices`.
pub fn one_of(choices: &'static [&'static str]) -> impl Fn(&str) -> Result<(), String> {
    move |value| {
        if choices.contains(&value) {
            Ok(())
        } else {
            Err(format!(
                "Invalid value {:?} (supported: {})",
                value,
                choices.join(", ")
            ))
        }
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}
