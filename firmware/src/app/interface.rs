//! Heat controller interface: arbitration between the two control surfaces.
//!
//! ```text
//!   menu ──HeatRequest──▶ heat request queue ─┐
//!                                             ├─▶ HeatControllerInterface ──▶ HeatController
//!   GATT write ──WirelessRequest──▶ wireless ─┘          │
//!                                                        ├─▶ menu queue (Preempt*/RequestDone)
//!                                                        └─▶ WirelessTransport::notify
//! ```
//!
//! Priorities are `Idle < Menu < Wireless`.  A request is accepted only
//! when its priority is strictly above the current owner's; anything else
//! is dropped without a state change or notification.
//!
//! Each accepted run gets a fresh token.  Its completion callback releases
//! ownership only while the token still matches, so the `Cancelled`
//! completion of a preempted run never clears the new owner.
//!
//! Constant-mode settings arrive as two separate wireless writes
//! (temperature, duration) tracked in a two-bit mask.  They are stored
//! whoever owns the controller; a wireless constant start needs both.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use log::{debug, info, warn};

use crate::app::ports::{CharacteristicId, ReadValue, WirelessTransport};
use crate::config::HEATER_TICK;
use crate::error::{Error, Result};
use crate::events::{HeatRequest, HeatRequestKind, MenuEvent, WirelessRequest};
use crate::heater::{HeatController, HeatOutcome, ProfileId};
use crate::scheduler::QueueHandle;
use crate::timer::TimerService;

/// Which surface currently owns the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Idle,
    Menu,
    Wireless,
}

/// Mode exposed on the mode characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateMode {
    Idle,
    Constant,
    Jedec,
}

impl PlateMode {
    pub const IDLE_BYTE: u8 = 0xFF;

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Idle => Self::IDLE_BYTE,
            Self::Constant => HeatRequestKind::Constant as u8,
            Self::Jedec => HeatRequestKind::Jedec as u8,
        }
    }

    fn of(request: &HeatRequest) -> Self {
        match request {
            HeatRequest::Constant { .. } => Self::Constant,
            HeatRequest::Profile(ProfileId::Jedec) => Self::Jedec,
        }
    }
}

const WRITE_TEMPERATURE: u8 = 0b01;
const WRITE_DURATION: u8 = 0b10;
const WRITE_BOTH: u8 = WRITE_TEMPERATURE | WRITE_DURATION;

/// Constant-mode settings accumulated from wireless writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstantSettings {
    pub temperature_c: u16,
    pub duration_s: u32,
    written: u8,
}

impl ConstantSettings {
    pub fn is_complete(&self) -> bool {
        self.written == WRITE_BOTH
    }
}

struct Arbitration {
    owner: Priority,
    run_token: u64,
    settings: ConstantSettings,
    mode: PlateMode,
    last_reported_c: Option<u16>,
}

pub struct HeatControllerInterface {
    me: Weak<HeatControllerInterface>,
    controller: Arc<HeatController>,
    transport: Arc<dyn WirelessTransport>,
    menu: QueueHandle<MenuEvent>,
    wireless: QueueHandle<WirelessRequest>,
    state: Mutex<Arbitration>,
}

const READABLE: [CharacteristicId; 4] = [
    CharacteristicId::TEMPERATURE,
    CharacteristicId::MODE,
    CharacteristicId::CONSTANT_TEMPERATURE,
    CharacteristicId::CONSTANT_DURATION,
];

const WRITABLE: [CharacteristicId; 3] = [
    CharacteristicId::MODE,
    CharacteristicId::CONSTANT_TEMPERATURE,
    CharacteristicId::CONSTANT_DURATION,
];

impl HeatControllerInterface {
    pub fn new(
        controller: Arc<HeatController>,
        transport: Arc<dyn WirelessTransport>,
        menu: QueueHandle<MenuEvent>,
        wireless: QueueHandle<WirelessRequest>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            controller,
            transport,
            menu,
            wireless,
            state: Mutex::new(Arbitration {
                owner: Priority::Idle,
                run_token: 0,
                settings: ConstantSettings::default(),
                mode: PlateMode::Idle,
                last_reported_c: None,
            }),
        })
    }

    /// Wire the interface up: queue subscriptions, GATT observers and the
    /// temperature telemetry callback on the controller tick.
    pub fn init(&self, heat_requests: &QueueHandle<HeatRequest>, timers: &TimerService) -> Result<()> {
        let me = self.me.clone();
        heat_requests
            .subscribe(move |request| {
                if let Some(this) = me.upgrade() {
                    log_rejection("menu", this.handle_menu_request(request));
                }
            })
            .ok_or(Error::CollectionFull)?;

        let me = self.me.clone();
        self.wireless
            .subscribe(move |request| {
                if let Some(this) = me.upgrade() {
                    log_rejection("wireless", this.handle_wireless_request(request));
                }
            })
            .ok_or(Error::CollectionFull)?;

        let me = self.me.clone();
        self.transport.add_read_observer(
            &READABLE,
            Arc::new(move |id: CharacteristicId| {
                me.upgrade().map(|this| this.read(id)).unwrap_or_default()
            }),
        )?;

        // Writes arrive on the radio's context; copy and hand them to the
        // consumer context.
        let wireless = self.wireless.clone();
        self.transport.add_write_observer(
            &WRITABLE,
            Arc::new(move |id: CharacteristicId, bytes: &[u8]| {
                let request = match WirelessRequest::new(id, bytes) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!("Interface: write to {:#06x} rejected: {}", id.0, e);
                        return;
                    }
                };
                if !wireless.enqueue(request) {
                    warn!("Interface: wireless queue full, write to {:#06x} dropped", id.0);
                }
            }),
        )?;

        let me = self.me.clone();
        timers.register_periodic_callback(HEATER_TICK, move |_| {
            if let Some(this) = me.upgrade() {
                this.report_temperature();
            }
        })?;

        info!("Interface: ready");
        Ok(())
    }

    pub fn owner(&self) -> Priority {
        self.lock().owner
    }

    pub fn mode(&self) -> PlateMode {
        self.lock().mode
    }

    pub fn settings(&self) -> ConstantSettings {
        self.lock().settings
    }

    /// A complete request from the local menu.
    pub fn handle_menu_request(&self, request: &HeatRequest) -> Result<()> {
        let token = {
            let mut st = self.lock();
            if Priority::Menu <= st.owner {
                debug!("Interface: menu request ignored, owned by {:?}", st.owner);
                return Ok(());
            }
            Self::take_ownership(&mut st, Priority::Menu, request)
        };
        info!("Interface: menu took control ({:?})", request);
        self.notify(CharacteristicId::MODE);
        self.launch(*request, Priority::Menu, token)
    }

    /// A characteristic write copied off the transport context.
    pub fn handle_wireless_request(&self, request: &WirelessRequest) -> Result<()> {
        let payload = request.payload.as_slice();
        match request.characteristic {
            CharacteristicId::CONSTANT_TEMPERATURE => {
                let temperature = u16::from_le_bytes(zero_extend(payload)?);
                self.store_setting(CharacteristicId::CONSTANT_TEMPERATURE, |settings| {
                    settings.temperature_c = temperature;
                    settings.written |= WRITE_TEMPERATURE;
                });
                Ok(())
            }
            CharacteristicId::CONSTANT_DURATION => {
                let duration = u32::from_le_bytes(zero_extend(payload)?);
                self.store_setting(CharacteristicId::CONSTANT_DURATION, |settings| {
                    settings.duration_s = duration;
                    settings.written |= WRITE_DURATION;
                });
                Ok(())
            }
            CharacteristicId::MODE => {
                let [raw] = zero_extend::<1>(payload)?;
                self.request_wireless(HeatRequestKind::try_from(raw)?)
            }
            other => {
                debug!("Interface: write to {:#06x} not handled", other.0);
                Err(Error::UnknownResource)
            }
        }
    }

    /// Telemetry: notify the temperature characteristic when the cached
    /// reading moved.
    pub fn report_temperature(&self) {
        let reading = self.controller.get_temperature();
        {
            let mut st = self.lock();
            if st.last_reported_c == Some(reading) {
                return;
            }
            st.last_reported_c = Some(reading);
        }
        self.notify(CharacteristicId::TEMPERATURE);
    }

    /// Settings writes carry wireless priority: ignored, like a start
    /// request, while wireless already owns the controller.
    fn store_setting(&self, id: CharacteristicId, update: impl FnOnce(&mut ConstantSettings)) {
        {
            let mut st = self.lock();
            if Priority::Wireless <= st.owner {
                debug!("Interface: write to {:#06x} ignored, owned by {:?}", id.0, st.owner);
                return;
            }
            update(&mut st.settings);
        }
        self.notify(id);
    }

    fn request_wireless(&self, kind: HeatRequestKind) -> Result<()> {
        let (request, token) = {
            let mut st = self.lock();
            if Priority::Wireless <= st.owner {
                debug!("Interface: wireless request ignored, owned by {:?}", st.owner);
                return Ok(());
            }
            let request = match kind {
                HeatRequestKind::Constant if !st.settings.is_complete() => {
                    st.settings = ConstantSettings::default();
                    drop(st);
                    warn!("Interface: constant start without temperature and duration");
                    self.notify_settings();
                    return Err(Error::InvalidState);
                }
                HeatRequestKind::Constant => HeatRequest::Constant {
                    temperature_c: st.settings.temperature_c,
                    duration_s: st.settings.duration_s,
                },
                HeatRequestKind::Jedec => HeatRequest::Profile(ProfileId::Jedec),
            };
            let token = Self::take_ownership(&mut st, Priority::Wireless, &request);
            (request, token)
        };
        info!("Interface: wireless took control ({:?})", request);
        self.signal_menu(MenuEvent::PreemptRequest);
        self.notify(CharacteristicId::MODE);
        self.launch(request, Priority::Wireless, token)
    }

    fn take_ownership(st: &mut Arbitration, owner: Priority, request: &HeatRequest) -> u64 {
        st.owner = owner;
        st.run_token = st.run_token.wrapping_add(1);
        st.mode = PlateMode::of(request);
        st.run_token
    }

    /// Cancel whatever runs and start `request` on behalf of `owner`.
    fn launch(&self, request: HeatRequest, owner: Priority, token: u64) -> Result<()> {
        self.controller.cancel()?;
        let me = self.me.clone();
        let clears_settings = Self::clears_settings(owner, &request);
        let on_complete = move |outcome: HeatOutcome| {
            if let Some(this) = me.upgrade() {
                debug!("Interface: {:?} run ended: {:?}", owner, outcome);
                this.release(owner, token, clears_settings);
            }
        };
        let started = match request {
            HeatRequest::Constant {
                temperature_c,
                duration_s,
            } => self
                .controller
                .start_constant(temperature_c, duration_s, on_complete),
            HeatRequest::Profile(profile) => {
                self.controller.start_multistage(profile, on_complete)
            }
        };
        if let Err(e) = started {
            warn!("Interface: {:?} start failed: {}", owner, e);
            self.release(owner, token, clears_settings);
            return Err(e);
        }
        Ok(())
    }

    /// A wireless constant run consumes the accumulated settings.
    fn clears_settings(owner: Priority, request: &HeatRequest) -> bool {
        owner == Priority::Wireless && matches!(request, HeatRequest::Constant { .. })
    }

    /// Hand control back if run `token` still owns it, then let the other
    /// surface resume.
    fn release(&self, owner: Priority, token: u64, clear_settings: bool) {
        {
            let mut st = self.lock();
            if st.owner != owner || st.run_token != token {
                debug!("Interface: stale completion for {:?} run {}", owner, token);
                return;
            }
            st.owner = Priority::Idle;
            st.mode = PlateMode::Idle;
            if clear_settings {
                st.settings = ConstantSettings::default();
            }
        }
        match owner {
            Priority::Wireless => self.signal_menu(MenuEvent::PreemptTake),
            Priority::Menu => self.signal_menu(MenuEvent::RequestDone),
            Priority::Idle => {}
        }
        self.notify(CharacteristicId::MODE);
        if clear_settings {
            self.notify_settings();
        }
    }

    fn read(&self, id: CharacteristicId) -> ReadValue {
        fn value(bytes: &[u8]) -> ReadValue {
            ReadValue::from_slice(bytes).unwrap_or_default()
        }
        let st = self.lock();
        match id {
            CharacteristicId::TEMPERATURE => value(&self.controller.get_temperature().to_le_bytes()),
            CharacteristicId::MODE => value(&[st.mode.as_byte()]),
            CharacteristicId::CONSTANT_TEMPERATURE => value(&st.settings.temperature_c.to_le_bytes()),
            CharacteristicId::CONSTANT_DURATION => value(&st.settings.duration_s.to_le_bytes()),
            _ => ReadValue::new(),
        }
    }

    fn signal_menu(&self, event: MenuEvent) {
        if !self.menu.enqueue(event) {
            warn!("Interface: menu queue full, {:?} dropped", event);
        }
    }

    fn notify_settings(&self) {
        self.notify(CharacteristicId::CONSTANT_TEMPERATURE);
        self.notify(CharacteristicId::CONSTANT_DURATION);
    }

    /// No connected peer is the normal case; nothing to report.
    fn notify(&self, id: CharacteristicId) {
        if let Err(e) = self.transport.notify(id) {
            debug!("Interface: notify {:#06x} skipped: {}", id.0, e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Arbitration> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Little-endian payload of up to `N` bytes, zero-extended.
fn zero_extend<const N: usize>(payload: &[u8]) -> Result<[u8; N]> {
    if payload.is_empty() || payload.len() > N {
        return Err(Error::InvalidInputParameter);
    }
    let mut out = [0u8; N];
    out[..payload.len()].copy_from_slice(payload);
    Ok(out)
}

fn log_rejection(surface: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!("Interface: {} request failed: {}", surface, e);
    }
}
