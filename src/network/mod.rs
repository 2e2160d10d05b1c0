pub mod wifi;

pub use self::wifi::WifiManager;
