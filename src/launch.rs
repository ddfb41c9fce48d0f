//! Process launch configuration
//!
//! The device index and listen address come from two positional arguments
//! when both are given, otherwise from the `DEVICE_ID` and `HOST`
//! environment variables, otherwise from the defaults.

use std::net::SocketAddr;

use crate::error::{Error, Result};
use crate::server::config::DEFAULT_BIND_ADDR;

/// Environment variable holding the capture device index
pub const DEVICE_ENV: &str = "DEVICE_ID";

/// Environment variable holding the listen address
pub const HOST_ENV: &str = "HOST";

/// Device used when none is configured
pub const DEFAULT_DEVICE: u32 = 0;

/// Where to capture from and where to listen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Capture device index
    pub device: u32,
    /// Listen address, `host:port`
    pub addr: String,
}

impl LaunchConfig {
    /// Resolve from positional arguments and an environment lookup
    pub fn resolve<F>(device_arg: Option<&str>, addr_arg: Option<&str>, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let (Some(device), Some(addr)) = (device_arg, addr_arg) {
            return Self {
                device: parse_device(device),
                addr: addr.to_string(),
            };
        }

        let device = env(DEVICE_ENV)
            .filter(|v| !v.is_empty())
            .map_or(DEFAULT_DEVICE, |v| parse_device(&v));
        let addr = env(HOST_ENV)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

        Self { device, addr }
    }

    /// Resolve using the process environment
    pub fn from_env(device_arg: Option<&str>, addr_arg: Option<&str>) -> Self {
        Self::resolve(device_arg, addr_arg, |key| std::env::var(key).ok())
    }

    /// Look up the listen address
    pub async fn bind_addr(&self) -> Result<SocketAddr> {
        tokio::net::lookup_host(self.addr.as_str())
            .await
            .map_err(|e| Error::Config(format!("invalid listen address {:?}: {}", self.addr, e)))?
            .next()
            .ok_or_else(|| Error::Config(format!("listen address {:?} did not resolve", self.addr)))
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE,
            addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

/// Leading decimal digits, anything unparsable maps to the default device
fn parse_device(value: &str) -> u32 {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(DEFAULT_DEVICE)
}
