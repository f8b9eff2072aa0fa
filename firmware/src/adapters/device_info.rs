//! Device information service: answers manufacturer name and model number
//! reads from configuration.

use std::sync::Arc;

use crate::app::ports::{CharacteristicId, ReadValue, WirelessTransport};
use crate::config::PlateConfig;
use crate::error::Result;

pub fn register(transport: &dyn WirelessTransport, config: &PlateConfig) -> Result<()> {
    let manufacturer = config.manufacturer_name.clone();
    let model = config.model_number.clone();
    transport.add_read_observer(
        &[
            CharacteristicId::MANUFACTURER_NAME,
            CharacteristicId::MODEL_NUMBER,
        ],
        Arc::new(move |id: CharacteristicId| {
            let text = if id == CharacteristicId::MANUFACTURER_NAME {
                &manufacturer
            } else {
                &model
            };
            ReadValue::from_slice(text.as_bytes()).unwrap_or_default()
        }),
    )
}
