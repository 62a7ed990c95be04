// MIT License - Copyright (c) 2026 Peter Wright
// Zone status

use bitflags::bitflags;

bitflags! {
    /// Zone status flags.
    ///
    /// Bit positions match the zone byte of a live event frame; status block
    /// frames carry the same flags as one bitmap per flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ZoneStatusFlags: u8 {
        /// Zone is open
        const OPEN        = 0b0000_0001;
        /// Tamper detected
        const TAMPER      = 0b0000_0010;
        /// Wireless sensor battery low
        const LOW_BATTERY = 0b0000_0100;
        /// Zone bypassed
        const BYPASSED    = 0b0000_1000;
        /// Zone in alarm
        const ALARM       = 0b0001_0000;
    }
}

/// Order in which the zone bitmaps appear in a zone status block.
pub const ZONE_BITMAP_ORDER: [ZoneStatusFlags; 5] = [
    ZoneStatusFlags::OPEN,
    ZoneStatusFlags::TAMPER,
    ZoneStatusFlags::LOW_BATTERY,
    ZoneStatusFlags::BYPASSED,
    ZoneStatusFlags::ALARM,
];

impl ZoneStatusFlags {
    /// Parse the zone byte of a live event, ignoring unknown bits.
    pub fn from_byte(b: u8) -> Self {
        Self::from_bits_truncate(b)
    }

    /// Get the flags that changed between old and new status.
    pub fn changed(old: Self, new: Self) -> Self {
        old ^ new
    }

    /// Get human-readable event names for flags that changed to set.
    pub fn set_event_names(changed: Self, new: Self) -> Vec<&'static str> {
        let mut events = Vec::new();
        let became_set = changed & new;
        if became_set.contains(Self::OPEN) { events.push("Open"); }
        if became_set.contains(Self::TAMPER) { events.push("Tamper"); }
        if became_set.contains(Self::LOW_BATTERY) { events.push("LowBattery"); }
        if became_set.contains(Self::BYPASSED) { events.push("Bypassed"); }
        if became_set.contains(Self::ALARM) { events.push("Alarm"); }
        events
    }

    /// Get human-readable event names for flags that changed to unset.
    pub fn unset_event_names(changed: Self, new: Self) -> Vec<&'static str> {
        let mut events = Vec::new();
        let became_unset = changed & !new;
        if became_unset.contains(Self::OPEN) { events.push("Closed"); }
        if became_unset.contains(Self::TAMPER) { events.push("TamperOk"); }
        if became_unset.contains(Self::LOW_BATTERY) { events.push("BatteryOk"); }
        if became_unset.contains(Self::BYPASSED) { events.push("UnBypassed"); }
        if became_unset.contains(Self::ALARM) { events.push("StandBy"); }
        events
    }

    pub fn is_open(&self) -> bool { self.contains(Self::OPEN) }
    pub fn is_tamper(&self) -> bool { self.contains(Self::TAMPER) }
    pub fn is_low_battery(&self) -> bool { self.contains(Self::LOW_BATTERY) }
    pub fn is_bypassed(&self) -> bool { self.contains(Self::BYPASSED) }
    pub fn is_alarm(&self) -> bool { self.contains(Self::ALARM) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_from_byte_ignores_unknown_bits() {
        let flags = ZoneStatusFlags::from_byte(0b1110_0011);
        assert!(flags.is_open());
        assert!(flags.is_tamper());
        assert!(!flags.is_alarm());
        assert_eq!(flags.bits(), 0b0000_0011);
    }

    #[test]
    fn test_zone_changed_flags() {
        let old = ZoneStatusFlags::OPEN | ZoneStatusFlags::BYPASSED;
        let new = ZoneStatusFlags::BYPASSED | ZoneStatusFlags::TAMPER;
        let changed = ZoneStatusFlags::changed(old, new);
        assert!(changed.contains(ZoneStatusFlags::OPEN));
        assert!(changed.contains(ZoneStatusFlags::TAMPER));
        assert!(!changed.contains(ZoneStatusFlags::BYPASSED));
    }

    #[test]
    fn test_zone_event_names() {
        let old = ZoneStatusFlags::OPEN;
        let new = ZoneStatusFlags::ALARM;
        let changed = ZoneStatusFlags::changed(old, new);
        assert_eq!(ZoneStatusFlags::set_event_names(changed, new), vec!["Alarm"]);
        assert_eq!(ZoneStatusFlags::unset_event_names(changed, new), vec!["Closed"]);
    }
}
