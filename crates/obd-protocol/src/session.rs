//! Cached adapter addressing

/// Mask that accepts exactly one 11-bit identifier
pub const STANDARD_MASK: u32 = 0x7FF;
/// Mask that accepts exactly one 29-bit identifier
pub const EXTENDED_MASK: u32 = 0x1FFF_FFFF;

/// Addressing the adapter is currently configured with.
///
/// Values are cached in their formatted form so a change of addressing
/// width (`7E4` vs `000007E4`) always counts as a change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Identifier used for outgoing frames (`ATSH`)
    pub bus_id: Option<String>,
    /// Receive filter (`ATCF`)
    pub rx_filter: Option<String>,
    /// Receive mask (`ATCM`)
    pub rx_mask: Option<String>,
    /// 29-bit addressing active
    pub extended: bool,
}

impl SessionState {
    /// Hex digits per identifier in the current addressing mode
    pub fn id_width(&self) -> usize {
        id_width(self.extended)
    }

    /// Format an identifier for an AT command
    pub fn format_id(&self, value: u32) -> String {
        format!("{:0width$X}", value, width = self.id_width())
    }

    /// Mask matching a single identifier in the current addressing mode
    pub fn full_mask(&self) -> u32 {
        if self.extended {
            EXTENDED_MASK
        } else {
            STANDARD_MASK
        }
    }
}

/// Hex digits per identifier for the given addressing mode
pub fn id_width(extended: bool) -> usize {
    if extended {
        8
    } else {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_standard_and_extended() {
        let mut state = SessionState::default();
        assert_eq!(state.format_id(0x7E4), "7E4");
        state.extended = true;
        assert_eq!(state.format_id(0x7E4), "000007E4");
        assert_eq!(state.format_id(0x18DA_F1C6), "18DAF1C6");
        assert_eq!(state.format_id(state.full_mask()), "1FFFFFFF");
    }
}
