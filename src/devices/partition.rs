// MIT License - Copyright (c) 2026 Peter Wright
// Partition status

use bitflags::bitflags;

bitflags! {
    /// Partition status flags, carried as a little-endian u16 per partition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PartitionStatusFlags: u16 {
        /// Fully (away) armed
        const ARMED        = 1 << 0;
        /// Stay armed
        const STAY_ARMED   = 1 << 1;
        /// Sleep armed
        const SLEEP_ARMED  = 1 << 2;
        /// Ready to arm (all zones closed)
        const READY        = 1 << 3;
        /// Audible alarm in progress
        const ALARM        = 1 << 4;
        /// Silent alarm in progress
        const SILENT_ALARM = 1 << 5;
        /// Fire alarm
        const FIRE         = 1 << 6;
        /// Panic alarm
        const PANIC        = 1 << 7;
        /// Duress code used
        const DURESS       = 1 << 8;
        /// Exit delay running
        const EXIT_DELAY   = 1 << 9;
        /// Entry delay running
        const ENTRY_DELAY  = 1 << 10;
        /// Partition trouble
        const TROUBLE      = 1 << 11;
        /// Alarm in memory
        const MEMORY       = 1 << 12;
    }
}

impl PartitionStatusFlags {
    /// Parse the two status bytes of a partition, ignoring unknown bits.
    pub fn from_le_bytes(b: [u8; 2]) -> Self {
        Self::from_bits_truncate(u16::from_le_bytes(b))
    }

    /// Get the flags that changed between old and new status.
    pub fn changed(old: Self, new: Self) -> Self {
        old ^ new
    }

    /// Any of the armed variants.
    pub fn is_armed(&self) -> bool {
        self.intersects(Self::ARMED | Self::STAY_ARMED | Self::SLEEP_ARMED)
    }

    pub fn is_ready(&self) -> bool { self.contains(Self::READY) }
    pub fn is_alarm(&self) -> bool { self.intersects(Self::ALARM | Self::SILENT_ALARM | Self::FIRE | Self::PANIC) }
    pub fn is_trouble(&self) -> bool { self.contains(Self::TROUBLE) }

    /// Get human-readable event names for flags that became set.
    pub fn set_event_names(changed: Self, new: Self) -> Vec<&'static str> {
        let became_set = changed & new;
        let mut events = Vec::new();
        if became_set.contains(Self::ARMED) { events.push("Armed"); }
        if became_set.contains(Self::STAY_ARMED) { events.push("StayArmed"); }
        if became_set.contains(Self::SLEEP_ARMED) { events.push("SleepArmed"); }
        if became_set.contains(Self::READY) { events.push("Ready"); }
        if became_set.contains(Self::ALARM) { events.push("Alarm"); }
        if became_set.contains(Self::SILENT_ALARM) { events.push("SilentAlarm"); }
        if became_set.contains(Self::FIRE) { events.push("Fire"); }
        if became_set.contains(Self::PANIC) { events.push("Panic"); }
        if became_set.contains(Self::DURESS) { events.push("Duress"); }
        if became_set.contains(Self::EXIT_DELAY) { events.push("ExitDelay"); }
        if became_set.contains(Self::ENTRY_DELAY) { events.push("EntryDelay"); }
        if became_set.contains(Self::TROUBLE) { events.push("Trouble"); }
        if became_set.contains(Self::MEMORY) { events.push("MemoryEvent"); }
        events
    }

    /// Get human-readable event names for flags that became unset.
    pub fn unset_event_names(changed: Self, new: Self) -> Vec<&'static str> {
        let became_unset = changed & !new;
        let mut events = Vec::new();
        if became_unset.contains(Self::ARMED) { events.push("Disarmed"); }
        if became_unset.contains(Self::STAY_ARMED) { events.push("StayDisarmed"); }
        if became_unset.contains(Self::SLEEP_ARMED) { events.push("SleepDisarmed"); }
        if became_unset.contains(Self::READY) { events.push("NotReady"); }
        if became_unset.contains(Self::ALARM) { events.push("StandBy"); }
        if became_unset.contains(Self::SILENT_ALARM) { events.push("SilentStandBy"); }
        if became_unset.contains(Self::FIRE) { events.push("NoFire"); }
        if became_unset.contains(Self::PANIC) { events.push("NoPanic"); }
        if became_unset.contains(Self::DURESS) { events.push("Free"); }
        if became_unset.contains(Self::EXIT_DELAY) { events.push("ExitDelayEnd"); }
        if became_unset.contains(Self::ENTRY_DELAY) { events.push("EntryDelayEnd"); }
        if became_unset.contains(Self::TROUBLE) { events.push("Ok"); }
        if became_unset.contains(Self::MEMORY) { events.push("MemoryAck"); }
        events
    }
}
