//! Chrome DevTools Protocol adapter for the tab host port.

pub mod cdp;
pub mod host;

pub use cdp::CdpClient;
pub use host::CdpHost;
