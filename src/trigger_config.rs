use crate::bit_vector::{BitVector128, VECTOR_BITS, VECTOR_BYTES};
use crate::signal_registry::{LayoutError, SignalLayout, Trigger, TriggerCondition};
use std::fmt;

/// Leading bytes of every configuration and command packet.
pub const PACKET_SYNC: [u8; 2] = [0x55, 0xAA];

/// Opcode of the command that starts sampling.
pub const ARM_OPCODE: u8 = 0x06;

/// Full length of one mask packet: sync, opcode, length, payload.
pub const MASK_PACKET_LEN: usize = 4 + VECTOR_BYTES;

/// Header preceding the bitstream on truth-table hardware.
pub const BITSTREAM_HEADER: [u8; 5] = [0xFE, 0xED, 0xFA, 0xCE, 0x00];

pub const BITSTREAM_LEN: usize = 256;

const TRUTH_TABLE_COUNT: usize = VECTOR_BITS / 2;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("Trigger refers to unknown signal '{signal}'")]
    UnresolvedTriggerSignal { signal: String },

    #[error("Trigger bit {bit} is outside signal '{signal}' (width {width})")]
    InvalidTriggerBit {
        signal: String,
        bit: usize,
        width: usize,
    },
}

/// Device-side representation of a trigger set.
pub trait TriggerConfig {
    /// Bytes that load the configuration into the device.
    fn config_bytes(&self) -> Vec<u8>;

    /// Separate command that starts sampling once configured, if the hardware has one.
    fn arm_command(&self) -> Option<[u8; 4]>;
}

/// Resolves a trigger to its global bit. Signals are looked up by name every time.
fn resolve(layout: &SignalLayout, trigger: &Trigger) -> Result<usize, EncodeError> {
    let signal = layout
        .get(&trigger.signal)
        .ok_or_else(|| EncodeError::UnresolvedTriggerSignal {
            signal: trigger.signal.clone(),
        })?;

    if trigger.bit >= signal.width {
        return Err(EncodeError::InvalidTriggerBit {
            signal: trigger.signal.clone(),
            bit: trigger.bit,
            width: signal.width,
        });
    }

    Ok(signal.low_bit + trigger.bit)
}

/// The five condition masks consumed by the opcode-protocol firmware.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TriggerMasks {
    masks: [BitVector128; 5],
}

impl TriggerMasks {
    pub fn encode(layout: &SignalLayout, triggers: &[Trigger]) -> Result<Self, EncodeError> {
        #[cfg(feature = "cpu-profiling")]
        let _span = crate::profile_span!("TriggerMasks::encode");

        let mut masks = [BitVector128::zeroed(); 5];
        for trigger in triggers {
            let bit = resolve(layout, trigger)?;
            if let Some(index) = trigger.condition.mask_index() {
                log::trace!("Trigger {} maps to data[{}]", trigger, bit);
                masks[index].set(bit);
            }
        }
        Ok(Self { masks })
    }

    pub fn mask(&self, condition: TriggerCondition) -> Option<&BitVector128> {
        condition.mask_index().map(|i| &self.masks[i])
    }

    /// Masks paired with their conditions, in opcode order.
    pub fn iter(&self) -> impl Iterator<Item = (TriggerCondition, &BitVector128)> {
        TriggerCondition::MASKED.into_iter().zip(self.masks.iter())
    }

    /// One configuration packet: `55 AA <opcode> 10 <16 data bytes>`.
    pub fn packet(&self, condition: TriggerCondition) -> Option<[u8; MASK_PACKET_LEN]> {
        let opcode = condition.opcode()?;
        let mask = self.mask(condition)?;

        let mut packet = [0u8; MASK_PACKET_LEN];
        packet[..2].copy_from_slice(&PACKET_SYNC);
        packet[2] = opcode;
        packet[3] = VECTOR_BYTES as u8;
        packet[4..].copy_from_slice(mask.as_bytes());
        Some(packet)
    }
}

impl TriggerConfig for TriggerMasks {
    fn config_bytes(&self) -> Vec<u8> {
        TriggerCondition::MASKED
            .iter()
            .filter_map(|c| self.packet(*c))
            .flatten()
            .collect()
    }

    fn arm_command(&self) -> Option<[u8; 4]> {
        Some([PACKET_SYNC[0], PACKET_SYNC[1], ARM_OPCODE, 0x00])
    }
}

impl fmt::Display for TriggerMasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (condition, mask) in self.iter() {
            writeln!(f, "Trigger mask {:>20} = {}", condition.as_str(), mask)?;
        }
        Ok(())
    }
}

/// Truth table for one channel pair.
///
/// Bit `(old1 << 3) | (cur1 << 2) | (old0 << 1) | cur0` is set when both channels'
/// conditions hold for that combination.
pub fn pair_truth_table(state0: TriggerCondition, state1: TriggerCondition) -> u16 {
    let mut table = 0u16;
    for index in 0..16u16 {
        let cur0 = index & 1 == 1;
        let old0 = (index >> 1) & 1 == 1;
        let cur1 = (index >> 2) & 1 == 1;
        let old1 = (index >> 3) & 1 == 1;
        if state0.holds(old0, cur0) && state1.holds(old1, cur1) {
            table |= 1 << index;
        }
    }
    table
}

/// Configuration for the earlier LUT-based hardware, which loads 64 channel-pair truth
/// tables through a shift register instead of taking condition masks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruthTableBitstream {
    tables: [u16; TRUTH_TABLE_COUNT],
}

impl TruthTableBitstream {
    pub fn encode(layout: &SignalLayout, triggers: &[Trigger]) -> Result<Self, EncodeError> {
        #[cfg(feature = "cpu-profiling")]
        let _span = crate::profile_span!("TruthTableBitstream::encode");

        // Only one condition per channel fits in a LUT; the last trigger on a bit wins.
        let mut states = [TriggerCondition::DontCare; VECTOR_BITS];
        for trigger in triggers {
            let bit = resolve(layout, trigger)?;
            states[bit] = trigger.condition;
        }

        let mut tables = [0u16; TRUTH_TABLE_COUNT];
        for (i, table) in tables.iter_mut().enumerate() {
            *table = pair_truth_table(states[2 * i], states[2 * i + 1]);
        }
        Ok(Self { tables })
    }

    pub fn tables(&self) -> &[u16; TRUTH_TABLE_COUNT] {
        &self.tables
    }

    /// Eight LUT columns per byte. Byte `i` carries shift-register position `255 - i`;
    /// the upper 16 bits of every 32-bit LUT slot are unused and stay zero.
    pub fn bitstream(&self) -> [u8; BITSTREAM_LEN] {
        let mut stream = [0u8; BITSTREAM_LEN];
        for (i, byte) in stream.iter_mut().enumerate() {
            let position = BITSTREAM_LEN - 1 - i;
            let bit = position & 0x1F;
            let lut = position >> 5;

            for col in 0..8 {
                let table = u32::from(self.tables[8 * lut + col]);
                if (table >> bit) & 1 == 1 {
                    *byte |= 1 << col;
                }
            }
        }
        stream
    }
}

impl TriggerConfig for TruthTableBitstream {
    fn config_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(BITSTREAM_HEADER.len() + BITSTREAM_LEN);
        bytes.extend_from_slice(&BITSTREAM_HEADER);
        bytes.extend_from_slice(&self.bitstream());
        bytes
    }

    fn arm_command(&self) -> Option<[u8; 4]> {
        None
    }
}
