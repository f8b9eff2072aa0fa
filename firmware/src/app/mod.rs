//! Application core: the domain logic above the port traits.
//!
//! The heat controller lives in [`crate::heater`]; this module holds the
//! two control surfaces layered on top of it, the local [`menu`] and the
//! arbitration [`interface`] that decides which surface drives the plate.
//! All interaction with hardware happens through the traits in [`ports`],
//! so every path here runs on the host against mocks.

pub mod interface;
pub mod menu;
pub mod ports;

use crate::adapters::display::DisplayRequest;
use crate::config::{DISPLAY_QUEUE, HEAT_REQUEST_QUEUE, MENU_QUEUE, WIRELESS_QUEUE};
use crate::error::Result;
use crate::events::{HeatRequest, MenuEvent, WirelessRequest};
use crate::scheduler::{QueueHandle, Scheduler};

/// Producer handles for every application queue.
#[derive(Clone)]
pub struct AppQueues {
    pub menu: QueueHandle<MenuEvent>,
    pub heat_requests: QueueHandle<HeatRequest>,
    pub wireless: QueueHandle<WirelessRequest>,
    pub display: QueueHandle<DisplayRequest>,
}

/// Declare the application queues in drain order.  Call before
/// [`Scheduler::init`].
pub fn declare_queues(scheduler: &mut Scheduler) -> Result<AppQueues> {
    Ok(AppQueues {
        menu: scheduler.declare(MENU_QUEUE)?,
        heat_requests: scheduler.declare(HEAT_REQUEST_QUEUE)?,
        wireless: scheduler.declare(WIRELESS_QUEUE)?,
        display: scheduler.declare(DISPLAY_QUEUE)?,
    })
}
