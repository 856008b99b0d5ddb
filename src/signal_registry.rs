use crate::bit_vector::VECTOR_BITS;
use std::fmt;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Signal name '{name}' is not valid")]
    InvalidName { name: String },

    #[error("Signal width {width} is out of range (1..=128)")]
    InvalidWidth { width: usize },

    #[error("A signal named '{name}' already exists")]
    DuplicateSignal { name: String },

    #[error("No signal named '{name}'")]
    UnknownSignal { name: String },

    #[error("Bit {bit} does not exist in signal '{name}' (width {width})")]
    InvalidBit {
        name: String,
        bit: usize,
        width: usize,
    },

    #[error("Index {index} is out of range")]
    IndexOutOfRange { index: usize },
}

/// Raised while assigning bit ranges.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Too many signals: {required} bits configured, only 128 available")]
    ConfigurationOverflow { required: usize },

    #[error("Signal '{name}' has width {width}, expected 1..=128")]
    InvalidSignalWidth { name: String, width: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerCondition {
    Low,
    High,
    Falling,
    Rising,
    Change,
    DontCare,
}

impl TriggerCondition {
    /// Conditions that own a device mask, in opcode order.
    pub const MASKED: [Self; 5] = [
        Self::Low,
        Self::High,
        Self::Falling,
        Self::Rising,
        Self::Change,
    ];

    /// 1-based configuration opcode, `None` for `DontCare`.
    pub fn opcode(self) -> Option<u8> {
        self.mask_index().map(|i| i as u8 + 1)
    }

    pub fn mask_index(self) -> Option<usize> {
        match self {
            Self::Low => Some(0),
            Self::High => Some(1),
            Self::Falling => Some(2),
            Self::Rising => Some(3),
            Self::Change => Some(4),
            Self::DontCare => None,
        }
    }

    /// Evaluates the condition for one channel given its previous and current level.
    pub fn holds(self, old: bool, current: bool) -> bool {
        match self {
            Self::Low => !current,
            Self::High => current,
            Self::Falling => old && !current,
            Self::Rising => !old && current,
            Self::Change => old != current,
            Self::DontCare => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "is low",
            Self::High => "is high",
            Self::Falling => "has a falling edge",
            Self::Rising => "has a rising edge",
            Self::Change => "changes",
            Self::DontCare => "don't care",
        }
    }
}

impl fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub name: String,
    pub width: usize,
}

impl Signal {
    pub fn new(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
        }
    }
}

/// A condition on one bit of a signal. The signal is referenced by name and looked up
/// again on every encode, so removing or reordering signals never re-targets a trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub signal: String,
    pub bit: usize,
    pub condition: TriggerCondition,
}

impl Trigger {
    pub fn new(signal: impl Into<String>, bit: usize, condition: TriggerCondition) -> Self {
        Self {
            signal: signal.into(),
            bit,
            condition,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] {}", self.signal, self.bit, self.condition)
    }
}

/// A signal together with the slice of the sample vector it occupies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedSignal {
    pub name: String,
    pub width: usize,
    pub high_bit: usize,
    pub low_bit: usize,
}

/// Bit-range assignment for an ordered signal list. Built fresh before each capture.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignalLayout {
    signals: Vec<PlacedSignal>,
}

impl SignalLayout {
    /// Packs signals from bit 127 downward in list order.
    pub fn assign(signals: &[Signal]) -> Result<Self, LayoutError> {
        if let Some(signal) = signals
            .iter()
            .find(|s| s.width == 0 || s.width > VECTOR_BITS)
        {
            return Err(LayoutError::InvalidSignalWidth {
                name: signal.name.clone(),
                width: signal.width,
            });
        }

        let required: usize = signals.iter().map(|s| s.width).sum();
        if required > VECTOR_BITS {
            return Err(LayoutError::ConfigurationOverflow { required });
        }

        let mut next_high = VECTOR_BITS;
        let placed = signals
            .iter()
            .map(|signal| {
                let high_bit = next_high - 1;
                let low_bit = next_high - signal.width;
                next_high = low_bit;
                log::trace!(
                    "Signal {} occupies data[{}:{}]",
                    signal.name,
                    high_bit,
                    low_bit
                );
                PlacedSignal {
                    name: signal.name.clone(),
                    width: signal.width,
                    high_bit,
                    low_bit,
                }
            })
            .collect();

        Ok(Self { signals: placed })
    }

    pub fn signals(&self) -> &[PlacedSignal] {
        &self.signals
    }

    pub fn get(&self, name: &str) -> Option<&PlacedSignal> {
        self.signals.iter().find(|s| s.name == name)
    }

    pub fn used_bits(&self) -> usize {
        self.signals.iter().map(|s| s.width).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

/// Ordered signals plus the trigger conditions that refer to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalRegistry {
    signals: Vec<Signal>,
    triggers: Vec<Trigger>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.signals.iter().find(|s| s.name == name)
    }

    fn position(&self, name: &str) -> Result<usize, RegistryError> {
        self.signals
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| RegistryError::UnknownSignal {
                name: name.to_string(),
            })
    }

    fn validate_name(name: &str) -> bool {
        !name.is_empty()
            && !name
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, '[' | ']' | ';' | '(' | ')' | '!'))
    }

    pub fn add_signal(&mut self, name: &str, width: usize) -> Result<(), RegistryError> {
        if !Self::validate_name(name) {
            return Err(RegistryError::InvalidName {
                name: name.to_string(),
            });
        }
        if width == 0 || width > VECTOR_BITS {
            return Err(RegistryError::InvalidWidth { width });
        }
        if self.signal(name).is_some() {
            return Err(RegistryError::DuplicateSignal {
                name: name.to_string(),
            });
        }

        log::debug!("Adding signal {} with width {}", name, width);
        self.signals.push(Signal::new(name, width));
        Ok(())
    }

    /// Removes a signal. Triggers naming it stay in place and fail at encode time.
    pub fn remove_signal(&mut self, name: &str) -> Result<Signal, RegistryError> {
        let index = self.position(name)?;
        let orphans = self.triggers.iter().filter(|t| t.signal == name).count();
        if orphans > 0 {
            log::warn!(
                "Removed signal {} is still referenced by {} trigger(s)",
                name,
                orphans
            );
        }
        Ok(self.signals.remove(index))
    }

    pub fn move_signal(&mut self, from: usize, to: usize) -> Result<(), RegistryError> {
        let len = self.signals.len();
        if from >= len {
            return Err(RegistryError::IndexOutOfRange { index: from });
        }
        if to >= len {
            return Err(RegistryError::IndexOutOfRange { index: to });
        }
        let signal = self.signals.remove(from);
        self.signals.insert(to, signal);
        Ok(())
    }

    /// Moves a signal one slot towards the front. No-op for the first signal.
    pub fn move_signal_up(&mut self, name: &str) -> Result<(), RegistryError> {
        let index = self.position(name)?;
        if index > 0 {
            self.signals.swap(index, index - 1);
        }
        Ok(())
    }

    /// Moves a signal one slot towards the back. No-op for the last signal.
    pub fn move_signal_down(&mut self, name: &str) -> Result<(), RegistryError> {
        let index = self.position(name)?;
        if index + 1 < self.signals.len() {
            self.signals.swap(index, index + 1);
        }
        Ok(())
    }

    pub fn add_trigger(
        &mut self,
        signal: &str,
        bit: usize,
        condition: TriggerCondition,
    ) -> Result<(), RegistryError> {
        let target = self
            .signal(signal)
            .ok_or_else(|| RegistryError::UnknownSignal {
                name: signal.to_string(),
            })?;
        if bit >= target.width {
            return Err(RegistryError::InvalidBit {
                name: signal.to_string(),
                bit,
                width: target.width,
            });
        }

        log::debug!("Adding trigger: {}[{}] {}", signal, bit, condition);
        self.triggers.push(Trigger::new(signal, bit, condition));
        Ok(())
    }

    pub fn remove_trigger(&mut self, index: usize) -> Result<Trigger, RegistryError> {
        if index >= self.triggers.len() {
            return Err(RegistryError::IndexOutOfRange { index });
        }
        Ok(self.triggers.remove(index))
    }

    pub fn clear(&mut self) {
        self.signals.clear();
        self.triggers.clear();
    }

    pub fn total_width(&self) -> usize {
        self.signals.iter().map(|s| s.width).sum()
    }

    pub fn free_bits(&self) -> usize {
        VECTOR_BITS.saturating_sub(self.total_width())
    }

    pub fn layout(&self) -> Result<SignalLayout, LayoutError> {
        SignalLayout::assign(&self.signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_packs_msb_first() {
        let signals = vec![
            Signal::new("clk", 1),
            Signal::new("buttons", 4),
            Signal::new("count", 32),
        ];
        let layout = SignalLayout::assign(&signals).unwrap();
        let placed = layout.signals();

        assert_eq!((placed[0].high_bit, placed[0].low_bit), (127, 127));
        assert_eq!((placed[1].high_bit, placed[1].low_bit), (126, 123));
        assert_eq!((placed[2].high_bit, placed[2].low_bit), (122, 91));
        assert_eq!(layout.used_bits(), 37);
    }

    #[test]
    fn test_layout_partitions_full_vector() {
        for widths in [vec![128], vec![64, 64], vec![1, 2, 3, 122], vec![7; 18]] {
            let signals: Vec<Signal> = widths
                .iter()
                .enumerate()
                .map(|(i, w)| Signal::new(format!("s{i}"), *w))
                .collect();
            let layout = SignalLayout::assign(&signals).unwrap();

            let mut covered = [false; VECTOR_BITS];
            let mut expected_high = VECTOR_BITS - 1;
            for placed in layout.signals() {
                assert_eq!(placed.high_bit, expected_high);
                assert_eq!(placed.high_bit - placed.low_bit + 1, placed.width);
                for bit in placed.low_bit..=placed.high_bit {
                    assert!(!covered[bit], "bit {bit} assigned twice");
                    covered[bit] = true;
                }
                expected_high = placed.low_bit.wrapping_sub(1);
            }
            let used: usize = widths.iter().sum();
            assert_eq!(covered.iter().filter(|c| **c).count(), used);
            // Unused bits are always at the bottom.
            assert!(covered[VECTOR_BITS - used..].iter().all(|c| *c));
        }
    }

    #[test]
    fn test_layout_overflow() {
        let signals = vec![Signal::new("a", 100), Signal::new("b", 29)];
        assert_eq!(
            SignalLayout::assign(&signals),
            Err(LayoutError::ConfigurationOverflow { required: 129 })
        );
    }

    #[test]
    fn test_layout_rejects_zero_width() {
        let signals = vec![Signal::new("all", 128), Signal::new("empty", 0)];
        assert_eq!(
            SignalLayout::assign(&signals),
            Err(LayoutError::InvalidSignalWidth {
                name: "empty".to_string(),
                width: 0
            })
        );

        let signals = vec![
            Signal::new("clk", 1),
            Signal::new("gap", 0),
            Signal::new("bus", 8),
        ];
        assert!(matches!(
            SignalLayout::assign(&signals),
            Err(LayoutError::InvalidSignalWidth { width: 0, .. })
        ));
    }

    #[test]
    fn test_layout_rejects_oversized_width() {
        let signals = vec![Signal::new("huge", usize::MAX), Signal::new("clk", 1)];
        assert_eq!(
            SignalLayout::assign(&signals),
            Err(LayoutError::InvalidSignalWidth {
                name: "huge".to_string(),
                width: usize::MAX
            })
        );
    }

    #[test]
    fn test_add_signal_validation() {
        let mut registry = SignalRegistry::new();
        registry.add_signal("clk", 1).unwrap();
        assert_eq!(
            registry.add_signal("clk", 2),
            Err(RegistryError::DuplicateSignal {
                name: "clk".to_string()
            })
        );
        assert_eq!(
            registry.add_signal("data", 0),
            Err(RegistryError::InvalidWidth { width: 0 })
        );
        assert_eq!(
            registry.add_signal("data", 129),
            Err(RegistryError::InvalidWidth { width: 129 })
        );
        assert!(matches!(
            registry.add_signal("two words", 1),
            Err(RegistryError::InvalidName { .. })
        ));
        assert!(matches!(
            registry.add_signal("", 1),
            Err(RegistryError::InvalidName { .. })
        ));
        assert_eq!(registry.free_bits(), 127);
    }

    #[test]
    fn test_add_trigger_validation() {
        let mut registry = SignalRegistry::new();
        registry.add_signal("buttons", 4).unwrap();
        registry
            .add_trigger("buttons", 3, TriggerCondition::Rising)
            .unwrap();
        assert!(matches!(
            registry.add_trigger("buttons", 4, TriggerCondition::High),
            Err(RegistryError::InvalidBit { bit: 4, width: 4, .. })
        ));
        assert!(matches!(
            registry.add_trigger("missing", 0, TriggerCondition::High),
            Err(RegistryError::UnknownSignal { .. })
        ));
        assert_eq!(registry.triggers().len(), 1);
    }

    #[test]
    fn test_remove_signal_keeps_triggers() {
        let mut registry = SignalRegistry::new();
        registry.add_signal("a", 2).unwrap();
        registry.add_signal("b", 2).unwrap();
        registry.add_trigger("a", 1, TriggerCondition::Low).unwrap();

        registry.remove_signal("a").unwrap();
        assert_eq!(registry.signals().len(), 1);
        assert_eq!(registry.triggers()[0].signal, "a");
        assert!(registry.remove_signal("a").is_err());
    }

    #[test]
    fn test_reorder_signals() {
        let mut registry = SignalRegistry::new();
        for name in ["a", "b", "c"] {
            registry.add_signal(name, 1).unwrap();
        }
        registry.move_signal_up("c").unwrap();
        registry.move_signal_up("a").unwrap();
        let names: Vec<_> = registry.signals().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["a", "c", "b"]);

        registry.move_signal_down("a").unwrap();
        registry.move_signal(2, 0).unwrap();
        let names: Vec<_> = registry.signals().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["b", "c", "a"]);

        assert_eq!(
            registry.move_signal(0, 3),
            Err(RegistryError::IndexOutOfRange { index: 3 })
        );
    }

    #[test]
    fn test_condition_opcodes() {
        let opcodes: Vec<_> = TriggerCondition::MASKED
            .iter()
            .map(|c| c.opcode().unwrap())
            .collect();
        assert_eq!(opcodes, [1, 2, 3, 4, 5]);
        assert_eq!(TriggerCondition::DontCare.opcode(), None);
    }

    #[test]
    fn test_condition_evaluation() {
        assert!(TriggerCondition::Rising.holds(false, true));
        assert!(!TriggerCondition::Rising.holds(true, true));
        assert!(TriggerCondition::Falling.holds(true, false));
        assert!(TriggerCondition::Change.holds(true, false));
        assert!(TriggerCondition::Change.holds(false, true));
        assert!(!TriggerCondition::Change.holds(true, true));
        assert!(TriggerCondition::Low.holds(true, false));
        assert!(TriggerCondition::High.holds(false, true));
        assert!(TriggerCondition::DontCare.holds(false, false));
    }
}
