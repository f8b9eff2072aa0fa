//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter       | Implements / provides | Connects to               |
//! |---------------|-----------------------|---------------------------|
//! | `gatt`        | WirelessTransport     | observer tables, radio sink |
//! | `ble`         | radio sink            | ESP-IDF Bluedroid GATT server |
//! | `device_info` | read observer         | device information service |
//! | `display`     | display queue, DisplayPort (`FrameBuffer`) | LCD driver / memory |

pub mod ble;
pub mod device_info;
pub mod display;
pub mod gatt;
