//! Execution-speed power throttling control blocks, and the primitive that applies them

use tracing::trace;

use crate::platform::{Platform, ThrottleError};



pub const PROCESS_POWER_THROTTLING_CURRENT_VERSION  : u32 = 1;
pub const PROCESS_POWER_THROTTLING_EXECUTION_SPEED  : u32 = 0x1;


# [ repr (C) ]
# [ derive (Debug, Eq, PartialEq) ]
/// Same layout as the Win32 `PROCESS_POWER_THROTTLING_STATE`, so it can be handed to the OS as-is
pub struct ThrottleDescriptor {
    pub version      : u32,
    pub control_mask : u32,
    pub state_mask   : u32,
}

impl ThrottleDescriptor {
    const fn execution_speed (enable:bool) -> ThrottleDescriptor {
        ThrottleDescriptor {
            version      : PROCESS_POWER_THROTTLING_CURRENT_VERSION,
            control_mask : PROCESS_POWER_THROTTLING_EXECUTION_SPEED,
            state_mask   : if enable { PROCESS_POWER_THROTTLING_EXECUTION_SPEED } else { 0 },
        }
    }
    pub fn enables_throttling (&self) -> bool {
        self.state_mask & PROCESS_POWER_THROTTLING_EXECUTION_SPEED != 0
    }
}

// the two blocks are built once and only ever handed out by reference
pub static THROTTLE_ON  : ThrottleDescriptor = ThrottleDescriptor::execution_speed (true);
pub static THROTTLE_OFF : ThrottleDescriptor = ThrottleDescriptor::execution_speed (false);

pub fn descriptor (enable:bool) -> &'static ThrottleDescriptor {
    if enable { &THROTTLE_ON } else { &THROTTLE_OFF }
}



# [ derive (Debug, Copy, Clone, Eq, PartialEq, Hash) ]
pub enum PriorityClass { Idle, Normal }



/// Applies (or removes) execution-speed throttling on a process, along with the matching priority class.
/// Both calls are always issued, even if the first one fails .. the first error (if any) is returned.
pub fn set_throttled <P:Platform> (platform:&P, handle:&P::Handle, enable:bool) -> Result <(), ThrottleError> {
    let class = if enable { PriorityClass::Idle } else { PriorityClass::Normal };
    let thr_res = platform.set_power_throttling (handle, descriptor(enable));
    let pri_res = platform.set_priority_class (handle, class);
    trace! ("set_throttled (enable:{enable}) .. throttling:{:?}, priority:{:?}", thr_res, pri_res);
    thr_res.and (pri_res)
}
