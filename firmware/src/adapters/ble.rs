//! BLE radio adapter.
//!
//! Puts the [`GattServer`] on air.  The server owns the characteristic
//! semantics; this module only registers the services, forwards GATT
//! accesses to it and carries its notifications back out.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via raw `esp_idf_svc::sys` calls.
//! - **all other targets**: simulation stubs that log instead of transmitting.
//!
//! Registration is a chain of Bluedroid events: app registered → service
//! created → one characteristic added per `ADD_CHAR` event, in
//! [`CHARACTERISTICS`] order, creating the next service whenever the
//! table crosses a service boundary.

use std::sync::Arc;

use log::info;

use super::gatt::GattServer;
#[cfg(target_os = "espidf")]
use super::gatt::{CHARACTERISTICS, characteristic};
use crate::app::ports::CharacteristicId;
use crate::error::Result;
#[cfg(target_os = "espidf")]
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleState {
    Idle,
    Advertising,
}

pub struct BleRadio {
    device_name: heapless::String<24>,
    state: BleState,
}

impl BleRadio {
    pub fn new(device_name: &str) -> Self {
        let mut name = heapless::String::new();
        for c in device_name.chars() {
            if name.push(c).is_err() {
                break;
            }
        }
        Self {
            device_name: name,
            state: BleState::Idle,
        }
    }

    pub fn state(&self) -> BleState {
        self.state
    }

    /// Bring the stack up, register the services and start advertising.
    /// Peer accesses are routed to `server` from then on.
    pub fn start(&mut self, server: Arc<GattServer>) -> Result<()> {
        self.platform_start(server)?;
        self.state = BleState::Advertising;
        info!("BLE: advertising as '{}'", self.device_name);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_start(&mut self, server: Arc<GattServer>) -> Result<()> {
        if bluedroid::SERVER.set(server).is_err() {
            return Err(Error::InvalidState);
        }
        bluedroid::start(&self.device_name)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&mut self, _server: Arc<GattServer>) -> Result<()> {
        info!("BLE(sim): radio stack skipped");
        Ok(())
    }
}

/// Radio sink for [`GattServer::new`]: transmit a notification.
#[cfg(target_os = "espidf")]
pub fn send_notification(id: CharacteristicId, value: &[u8]) {
    bluedroid::notify(id, value);
}

#[cfg(not(target_os = "espidf"))]
pub fn send_notification(id: CharacteristicId, value: &[u8]) {
    log::debug!("BLE(sim): notify {:#06x} {:02x?}", id.0, value);
}

// ───────────────────────────────────────────────────────────────
// Bluedroid glue
// ───────────────────────────────────────────────────────────────

// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures; these statics bridge the callback context to the server.
#[cfg(target_os = "espidf")]
mod bluedroid {
    use core::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
    use std::ffi::CString;
    use std::sync::{Arc, OnceLock};

    use esp_idf_svc::sys::*;
    use log::{error, info, warn};

    use super::{CHARACTERISTICS, CharacteristicId, Error, GattServer, characteristic};
    use crate::error::Result;

    pub(super) static SERVER: OnceLock<Arc<GattServer>> = OnceLock::new();

    static GATTS_IF: AtomicU16 = AtomicU16::new(0);
    static CONN_ID: AtomicU16 = AtomicU16::new(0);
    static SERVICE_HANDLE: AtomicU16 = AtomicU16::new(0);
    static NEXT_CHAR: AtomicUsize = AtomicUsize::new(0);
    static CHAR_HANDLES: [AtomicU16; CHARACTERISTICS.len()] =
        [const { AtomicU16::new(0) }; CHARACTERISTICS.len()];

    const HANDLES_PER_SERVICE: u16 = 16;

    fn check(rc: esp_err_t, what: &str) -> Result<()> {
        if rc == ESP_OK as i32 {
            Ok(())
        } else {
            error!("BLE: {} failed ({})", what, rc);
            Err(Error::ResourceUnavailable)
        }
    }

    pub(super) fn start(device_name: &str) -> Result<()> {
        let name = CString::new(device_name).map_err(|_| Error::InvalidInputParameter)?;
        // SAFETY: called once from main() before any BLE event can arrive.
        unsafe {
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            check(esp_bt_controller_init(&mut bt_cfg), "bt_controller_init")?;
            check(
                esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
                "bt_controller_enable",
            )?;
            check(esp_bluedroid_init(), "bluedroid_init")?;
            check(esp_bluedroid_enable(), "bluedroid_enable")?;

            check(
                esp_ble_gap_register_callback(Some(gap_event_handler)),
                "gap_register_callback",
            )?;
            check(
                esp_ble_gatts_register_callback(Some(gatts_event_handler)),
                "gatts_register_callback",
            )?;
            check(esp_ble_gatts_app_register(0), "gatts_app_register")?;
            check(esp_ble_gap_set_device_name(name.as_ptr()), "set_device_name")?;
            start_advertising();
        }
        info!("BLE(espidf): Bluedroid stack initialized");
        Ok(())
    }

    pub(super) fn notify(id: CharacteristicId, value: &[u8]) {
        let Some(handle) = handle_for(id) else {
            warn!("BLE: no attribute handle for {:#06x}", id.0);
            return;
        };
        // SAFETY: Bluedroid copies the value before returning.
        unsafe {
            esp_ble_gatts_send_indicate(
                GATTS_IF.load(Ordering::Relaxed) as esp_gatt_if_t,
                CONN_ID.load(Ordering::Relaxed),
                handle,
                value.len() as u16,
                value.as_ptr() as *mut u8,
                false,
            );
        }
    }

    fn handle_for(id: CharacteristicId) -> Option<u16> {
        let index = CHARACTERISTICS.iter().position(|c| c.id == id)?;
        let handle = CHAR_HANDLES[index].load(Ordering::Relaxed);
        (handle != 0).then_some(handle)
    }

    fn id_for_handle(handle: u16) -> Option<CharacteristicId> {
        CHAR_HANDLES
            .iter()
            .position(|h| handle != 0 && h.load(Ordering::Relaxed) == handle)
            .map(|index| CHARACTERISTICS[index].id)
    }

    fn uuid16(value: u16) -> esp_bt_uuid_t {
        // SAFETY: plain-old-data union; zero is a valid bit pattern.
        let mut uuid: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        uuid.len = 2;
        uuid.uuid.uuid16 = value;
        uuid
    }

    fn uuid128(bytes: [u8; 16]) -> esp_bt_uuid_t {
        // SAFETY: plain-old-data union; zero is a valid bit pattern.
        let mut uuid: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        uuid.len = 16;
        uuid.uuid.uuid128 = bytes;
        uuid
    }

    unsafe fn start_advertising() {
        unsafe {
            let mut adv_params = esp_ble_adv_params_t {
                adv_int_min: 0x20,
                adv_int_max: 0x40,
                adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
                own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
                channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
                adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
                ..core::mem::zeroed()
            };
            esp_ble_gap_start_advertising(&mut adv_params);
        }
    }

    unsafe fn create_service(gatts_if: esp_gatt_if_t, service: u16) {
        let mut id = esp_gatt_srvc_id_t {
            id: esp_gatt_id_t {
                uuid: uuid16(service),
                inst_id: 0,
            },
            is_primary: true,
        };
        unsafe {
            esp_ble_gatts_create_service(gatts_if, &mut id, HANDLES_PER_SERVICE);
        }
    }

    unsafe fn add_characteristic(service_handle: u16, index: usize) {
        let def = CHARACTERISTICS[index];
        let mut uuid = uuid128(def.id.uuid128());
        let mut perm = ESP_GATT_PERM_READ;
        let mut prop = ESP_GATT_CHAR_PROP_BIT_READ;
        if def.writable {
            perm |= ESP_GATT_PERM_WRITE;
            prop |= ESP_GATT_CHAR_PROP_BIT_WRITE;
        }
        if def.notify {
            prop |= ESP_GATT_CHAR_PROP_BIT_NOTIFY;
        }
        unsafe {
            esp_ble_gatts_add_char(
                service_handle,
                &mut uuid,
                perm as esp_gatt_perm_t,
                prop as esp_gatt_char_prop_t,
                core::ptr::null_mut(),
                core::ptr::null_mut(),
            );
        }
    }

    unsafe extern "C" fn gap_event_handler(
        event: esp_gap_ble_cb_event_t,
        _param: *mut esp_ble_gap_cb_param_t,
    ) {
        match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
                info!("BLE GAP: advertising started");
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
                info!("BLE GAP: advertising stopped");
            }
            _ => {}
        }
    }

    unsafe extern "C" fn gatts_event_handler(
        event: esp_gatts_cb_event_t,
        gatts_if: esp_gatt_if_t,
        param: *mut esp_ble_gatts_cb_param_t,
    ) {
        let Some(server) = SERVER.get() else {
            return;
        };
        unsafe {
            match event {
                esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
                    GATTS_IF.store(u16::from(gatts_if), Ordering::Relaxed);
                    info!("BLE GATTS: app registered (if={})", gatts_if);
                    create_service(gatts_if, CHARACTERISTICS[0].service);
                }
                esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
                    let handle = (*param).create.service_handle;
                    SERVICE_HANDLE.store(handle, Ordering::Relaxed);
                    esp_ble_gatts_start_service(handle);
                    add_characteristic(handle, NEXT_CHAR.load(Ordering::Relaxed));
                }
                esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
                    let index = NEXT_CHAR.fetch_add(1, Ordering::Relaxed);
                    let Some(slot) = CHAR_HANDLES.get(index) else {
                        return;
                    };
                    slot.store((*param).add_char.attr_handle, Ordering::Relaxed);
                    match CHARACTERISTICS.get(index + 1) {
                        Some(next) if next.service == CHARACTERISTICS[index].service => {
                            add_characteristic(SERVICE_HANDLE.load(Ordering::Relaxed), index + 1);
                        }
                        Some(next) => create_service(gatts_if, next.service),
                        None => info!("BLE GATTS: all characteristics registered"),
                    }
                }
                esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
                    CONN_ID.store((*param).connect.conn_id, Ordering::Relaxed);
                    server.set_connected(true);
                }
                esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
                    server.set_connected(false);
                    start_advertising();
                }
                esp_gatts_cb_event_t_ESP_GATTS_READ_EVT => {
                    let p = &(*param).read;
                    let mut rsp: esp_gatt_rsp_t = core::mem::zeroed();
                    rsp.attr_value.handle = p.handle;
                    let status = match id_for_handle(p.handle).map(|id| server.handle_read(id)) {
                        Some(Ok(value)) => {
                            rsp.attr_value.len = value.len() as u16;
                            rsp.attr_value.value[..value.len()].copy_from_slice(&value);
                            esp_gatt_status_t_ESP_GATT_OK
                        }
                        _ => esp_gatt_status_t_ESP_GATT_READ_NOT_PERMIT,
                    };
                    esp_ble_gatts_send_response(gatts_if, p.conn_id, p.trans_id, status, &mut rsp);
                }
                esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
                    let p = &(*param).write;
                    let data = core::slice::from_raw_parts(p.value, usize::from(p.len));
                    let written = id_for_handle(p.handle)
                        .filter(|id| characteristic(*id).is_some())
                        .map(|id| server.handle_write(id, data));
                    let status = match written {
                        Some(Ok(())) => esp_gatt_status_t_ESP_GATT_OK,
                        _ => esp_gatt_status_t_ESP_GATT_WRITE_NOT_PERMIT,
                    };
                    if p.need_rsp {
                        esp_ble_gatts_send_response(
                            gatts_if,
                            p.conn_id,
                            p.trans_id,
                            status,
                            core::ptr::null_mut(),
                        );
                    }
                }
                _ => {}
            }
        }
    }
}
