// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright Tock Contributors 2022.

use tock_registers::{register_bitfields, LocalRegisterCopy};

use super::super::devices::{VirtIODeviceDriver, VirtIODeviceType};

register_bitfields![u64,
    pub VirtIONetFeatures [
        VirtIONetFCsum OFFSET(0) NUMBITS(1),
        VirtIONetFGuestCsum OFFSET(1) NUMBITS(1),
        VirtIONetFCtrlGuestOffloads OFFSET(2) NUMBITS(1),
        VirtIONetFMtu OFFSET(3) NUMBITS(1),
        VirtIONetFMac OFFSET(5) NUMBITS(1),
        VirtIONetFGuestTso4 OFFSET(7) NUMBITS(1),
        VirtIONetFGuestTso6 OFFSET(8) NUMBITS(1),
        VirtIONetFGuestEcn OFFSET(9) NUMBITS(1),
        VirtIONetFGuestUfo OFFSET(10) NUMBITS(1),
        VirtIONetFHostTso4 OFFSET(11) NUMBITS(1),
        VirtIONetFHostTso6 OFFSET(12) NUMBITS(1),
        VirtIONetFHostEcn OFFSET(13) NUMBITS(1),
        VirtIONetFHostUfo OFFSET(14) NUMBITS(1),
        VirtIONetFMrgRxbuf OFFSET(15) NUMBITS(1),
        VirtIONetFStatus OFFSET(16) NUMBITS(1),
        VirtIONetFCtrlVq OFFSET(17) NUMBITS(1),
        VirtIONetFCtrlRx OFFSET(18) NUMBITS(1),
        VirtIONetFCtrlVlan OFFSET(19) NUMBITS(1),
        VirtIONetFGuestAnnounce OFFSET(21) NUMBITS(1),
        VirtIONetFMq OFFSET(22) NUMBITS(1),
        VirtIONetFCtrlMacAddr OFFSET(23) NUMBITS(1),
    ]
];

pub type VirtIONetFeaturesVal = LocalRegisterCopy<u64, VirtIONetFeatures::Register>;

/// Feature negotiation policy for network cards.
///
/// Every offered feature is accepted, including checksum offloading to the
/// device, except the control virtqueue, guest-side segmentation offloads and
/// mergeable receive buffers.
#[derive(Copy, Clone, Debug, Default)]
pub struct VirtIONetNegotiation;

impl VirtIODeviceDriver for VirtIONetNegotiation {
    fn negotiate_features(&self, offered_features: u64) -> Option<u64> {
        let mut negotiated = VirtIONetFeaturesVal::new(offered_features);

        negotiated.modify(
            VirtIONetFeatures::VirtIONetFCtrlVq::CLEAR
                + VirtIONetFeatures::VirtIONetFGuestTso4::CLEAR
                + VirtIONetFeatures::VirtIONetFGuestTso6::CLEAR
                + VirtIONetFeatures::VirtIONetFGuestUfo::CLEAR
                + VirtIONetFeatures::VirtIONetFMrgRxbuf::CLEAR,
        );

        Some(negotiated.get())
    }

    fn device_type(&self) -> VirtIODeviceType {
        VirtIODeviceType::NetworkCard
    }
}

#[cfg(test)]
mod tests {
    use super::{VirtIONetFeatures, VirtIONetFeaturesVal, VirtIONetNegotiation};
    use crate::devices::{VirtIODeviceDriver, VirtIODeviceType};

    #[test]
    fn rejects_unsupported_offloads() {
        let mut offered = VirtIONetFeaturesVal::new(0);
        offered.modify(
            VirtIONetFeatures::VirtIONetFCsum::SET
                + VirtIONetFeatures::VirtIONetFMac::SET
                + VirtIONetFeatures::VirtIONetFGuestTso4::SET
                + VirtIONetFeatures::VirtIONetFGuestTso6::SET
                + VirtIONetFeatures::VirtIONetFGuestUfo::SET
                + VirtIONetFeatures::VirtIONetFMrgRxbuf::SET
                + VirtIONetFeatures::VirtIONetFStatus::SET
                + VirtIONetFeatures::VirtIONetFCtrlVq::SET,
        );

        let accepted = VirtIONetNegotiation
            .negotiate_features(offered.get())
            .map(VirtIONetFeaturesVal::new)
            .unwrap();

        assert!(accepted.is_set(VirtIONetFeatures::VirtIONetFCsum));
        assert!(accepted.is_set(VirtIONetFeatures::VirtIONetFMac));
        assert!(accepted.is_set(VirtIONetFeatures::VirtIONetFStatus));
        assert!(!accepted.is_set(VirtIONetFeatures::VirtIONetFGuestTso4));
        assert!(!accepted.is_set(VirtIONetFeatures::VirtIONetFGuestTso6));
        assert!(!accepted.is_set(VirtIONetFeatures::VirtIONetFGuestUfo));
        assert!(!accepted.is_set(VirtIONetFeatures::VirtIONetFMrgRxbuf));
        assert!(!accepted.is_set(VirtIONetFeatures::VirtIONetFCtrlVq));
    }

    #[test]
    fn checksum_not_forced() {
        let accepted = VirtIONetNegotiation.negotiate_features(1 << 5);
        assert_eq!(accepted, Some(1 << 5));
        assert_eq!(
            VirtIONetNegotiation.device_type(),
            VirtIODeviceType::NetworkCard
        );
    }
}
