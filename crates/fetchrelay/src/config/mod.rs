pub mod settings;

pub use settings::{
    is_valid_host, Overrides, ProtocolPreference, RelayEndpoint, RelayProtocol, Retention,
    Settings,
};
