// MIT License - Copyright (c) 2026 Peter Wright
// System (panel-wide) status

use bitflags::bitflags;

bitflags! {
    /// Panel-wide trouble and power flags, carried as a little-endian u16.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SystemStatusFlags: u16 {
        /// Mains power lost
        const AC_FAILURE         = 1 << 0;
        /// Backup battery low
        const LOW_BATTERY        = 1 << 1;
        /// Backup battery missing
        const NO_BATTERY         = 1 << 2;
        /// Bell/siren trouble
        const BELL_TROUBLE       = 1 << 3;
        /// Phone line trouble
        const PHONE_LINE_TROUBLE = 1 << 4;
        /// Failure to communicate with the monitoring station
        const COMM_FAILURE       = 1 << 5;
        /// Clock lost
        const CLOCK_LOST         = 1 << 6;
        /// Panel box tamper
        const BOX_TAMPER         = 1 << 7;
        /// Wireless jamming detected
        const RF_JAMMING         = 1 << 8;
        /// Bus module trouble
        const MODULE_TROUBLE     = 1 << 9;
        /// Auxiliary output overload
        const AUX_OVERLOAD       = 1 << 10;
        /// Installer programming in progress
        const PROG_MODE          = 1 << 11;
    }
}

impl SystemStatusFlags {
    /// Parse the two system bytes, ignoring unknown bits.
    pub fn from_le_bytes(b: [u8; 2]) -> Self {
        Self::from_bits_truncate(u16::from_le_bytes(b))
    }

    /// Get the flags that changed between old and new status.
    pub fn changed(old: Self, new: Self) -> Self {
        old ^ new
    }

    /// Any trouble condition other than programming mode.
    pub fn has_trouble(&self) -> bool {
        !(*self - Self::PROG_MODE).is_empty()
    }

    pub fn is_ac_failure(&self) -> bool { self.contains(Self::AC_FAILURE) }
    pub fn is_low_battery(&self) -> bool { self.contains(Self::LOW_BATTERY) }
    pub fn is_prog_mode(&self) -> bool { self.contains(Self::PROG_MODE) }

    /// Get human-readable event names for flags that became set.
    pub fn set_event_names(changed: Self, new: Self) -> Vec<&'static str> {
        let became_set = changed & new;
        let mut events = Vec::new();
        if became_set.contains(Self::AC_FAILURE) { events.push("ACUnplugged"); }
        if became_set.contains(Self::LOW_BATTERY) { events.push("LowBattery"); }
        if became_set.contains(Self::NO_BATTERY) { events.push("NoBattery"); }
        if became_set.contains(Self::BELL_TROUBLE) { events.push("BellTrouble"); }
        if became_set.contains(Self::PHONE_LINE_TROUBLE) { events.push("PhoneLineTrouble"); }
        if became_set.contains(Self::COMM_FAILURE) { events.push("CommFailure"); }
        if became_set.contains(Self::CLOCK_LOST) { events.push("ClockLost"); }
        if became_set.contains(Self::BOX_TAMPER) { events.push("BoxTamperOpen"); }
        if became_set.contains(Self::RF_JAMMING) { events.push("RfJamming"); }
        if became_set.contains(Self::MODULE_TROUBLE) { events.push("ModuleTrouble"); }
        if became_set.contains(Self::AUX_OVERLOAD) { events.push("AuxOverload"); }
        if became_set.contains(Self::PROG_MODE) { events.push("ProgModeOn"); }
        events
    }

    /// Get human-readable event names for flags that became unset.
    pub fn unset_event_names(changed: Self, new: Self) -> Vec<&'static str> {
        let became_unset = changed & !new;
        let mut events = Vec::new();
        if became_unset.contains(Self::AC_FAILURE) { events.push("ACPlugged"); }
        if became_unset.contains(Self::LOW_BATTERY) { events.push("BatteryOk"); }
        if became_unset.contains(Self::NO_BATTERY) { events.push("BatteryPresent"); }
        if became_unset.contains(Self::BELL_TROUBLE) { events.push("BellOk"); }
        if became_unset.contains(Self::PHONE_LINE_TROUBLE) { events.push("PhoneLineOk"); }
        if became_unset.contains(Self::COMM_FAILURE) { events.push("CommOk"); }
        if became_unset.contains(Self::CLOCK_LOST) { events.push("ClockOk"); }
        if became_unset.contains(Self::BOX_TAMPER) { events.push("BoxTamperClosed"); }
        if became_unset.contains(Self::RF_JAMMING) { events.push("RfOk"); }
        if became_unset.contains(Self::MODULE_TROUBLE) { events.push("ModuleOk"); }
        if became_unset.contains(Self::AUX_OVERLOAD) { events.push("AuxOk"); }
        if became_unset.contains(Self::PROG_MODE) { events.push("ProgModeOff"); }
        events
    }
}
