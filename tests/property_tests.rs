//! Property-based tests for porthop
//!
//! Uses proptest to check schedule invariants across large input spaces.

use proptest::prelude::*;

// ============================================================================
// Port Derivation Properties
// ============================================================================

mod derivation_properties {
    use super::*;
    use porthop_core::{TotpGenerator, derive_port};

    fn generator(key: &[u8]) -> TotpGenerator {
        TotpGenerator::from_bytes(key).unwrap()
    }

    proptest! {
        /// Derived ports always fall inside [base, base + range)
        #[test]
        fn port_within_range(
            key in prop::collection::vec(any::<u8>(), 1..64),
            time in 0i64..4_000_000_000,
            period in 1u32..3600,
            base in 1u16..60_000,
            range in 1u16..5_000,
        ) {
            prop_assume!(u32::from(base) + u32::from(range) <= 65_536);
            let port = derive_port(&generator(&key), time, period, base, range).unwrap();
            prop_assert!(port >= base);
            prop_assert!(u32::from(port) < u32::from(base) + u32::from(range));
        }

        /// Every instant of a period derives the same port
        #[test]
        fn port_constant_within_period(
            key in prop::collection::vec(any::<u8>(), 1..64),
            window in 0i64..100_000_000,
            period in 1u32..600,
            shift in 0u32..600,
        ) {
            let totp = generator(&key);
            let start = window * i64::from(period);
            let inside = start + i64::from(shift % period);
            prop_assert_eq!(
                derive_port(&totp, start, period, 10_000, 1000).unwrap(),
                derive_port(&totp, inside, period, 10_000, 1000).unwrap()
            );
        }

        /// Codes are six digits at most
        #[test]
        fn code_has_six_digits(
            key in prop::collection::vec(any::<u8>(), 1..64),
            time in 0i64..4_000_000_000,
        ) {
            let code = generator(&key).code(time, 30).unwrap();
            prop_assert!(code < 1_000_000);
        }
    }
}

// ============================================================================
// Time Window Properties
// ============================================================================

mod window_properties {
    use super::*;
    use porthop_core::TimeWindow;

    proptest! {
        /// The validity interval spans one period plus both extensions
        #[test]
        fn window_span(
            offset in -3600i64..3600,
            period in 1u32..3600,
            extension in 0u32..3600,
            now in 0i64..4_000_000_000,
        ) {
            let window = TimeWindow::compute(offset, period, extension, now);
            prop_assert_eq!(window.span(), i64::from(period) + 2 * i64::from(extension));
            prop_assert_eq!(window.window_start.rem_euclid(i64::from(period)), 0);
            prop_assert_eq!(window.valid_start, window.window_start - i64::from(extension));
        }

        /// The window start is the last period boundary at or before now + offset
        #[test]
        fn window_start_bounds(
            offset in -3600i64..3600,
            period in 1u32..3600,
            now in 0i64..4_000_000_000,
        ) {
            let window = TimeWindow::compute(offset, period, 0, now);
            let shifted = now + offset;
            prop_assert!(window.window_start <= shifted);
            prop_assert!(shifted < window.window_start + i64::from(period));
        }

        /// Window starts never move backwards as time advances
        #[test]
        fn window_start_monotonic(
            offset in -3600i64..3600,
            period in 1u32..3600,
            now in 0i64..4_000_000_000,
            step in 0i64..100_000,
        ) {
            let earlier = TimeWindow::compute(offset, period, 15, now);
            let later = TimeWindow::compute(offset, period, 15, now + step);
            prop_assert!(later.window_start >= earlier.window_start);
        }

        /// Active is the half-open interval [valid_start, valid_end)
        #[test]
        fn half_open_activity(
            offset in -3600i64..3600,
            period in 1u32..3600,
            extension in 0u32..3600,
            now in 0i64..4_000_000_000,
        ) {
            let window = TimeWindow::compute(offset, period, extension, now);
            prop_assert!(window.is_active(window.valid_start));
            prop_assert!(window.is_active(window.valid_end - 1));
            prop_assert!(!window.is_active(window.valid_end));
            prop_assert!(!window.is_active(window.valid_start - 1));
            prop_assert!(window.is_expired(window.valid_end));
            prop_assert!(!window.is_expired(window.valid_end - 1));
        }
    }
}

// ============================================================================
// Schedule Properties
// ============================================================================

mod schedule_properties {
    use super::*;
    use porthop_core::{PortSchedule, ScheduleParams, TotpGenerator};

    fn schedule(offsets: Vec<i64>, extension: u32) -> PortSchedule {
        let totp = TotpGenerator::from_base32("JBSWY3DPEHPK3PXP").unwrap();
        PortSchedule::new(
            totp,
            ScheduleParams {
                period: 30,
                extension,
                base_port: 3000,
                port_range: 1000,
                offsets,
            },
        )
        .unwrap()
    }

    proptest! {
        /// Repeated queries at the same instant agree
        #[test]
        fn valid_ports_deterministic(
            offsets in prop::collection::vec(-120i64..120, 0..6),
            now in 10_000i64..4_000_000_000,
        ) {
            let schedule = schedule(offsets, 15);
            prop_assert_eq!(schedule.valid_ports(now), schedule.valid_ports(now));
        }

        /// One assignment per offset, in configured order
        #[test]
        fn valid_ports_follow_offsets(
            offsets in prop::collection::vec(-120i64..120, 0..6),
            now in 10_000i64..4_000_000_000,
        ) {
            let schedule = schedule(offsets.clone(), 15);
            let ports = schedule.valid_ports(now);
            prop_assert_eq!(ports.len(), offsets.len());
            for (assignment, offset) in ports.iter().zip(&offsets) {
                prop_assert_eq!(assignment.offset(), *offset);
                prop_assert!((3000..4000).contains(&assignment.port));
            }
        }

        /// Active ports are exactly the valid ports whose window contains now
        #[test]
        fn active_ports_subset(
            offsets in prop::collection::vec(-120i64..120, 0..6),
            extension in 0u32..30,
            now in 10_000i64..4_000_000_000,
        ) {
            let schedule = schedule(offsets, extension);
            let valid = schedule.valid_ports(now);
            let active = schedule.active_ports(now);
            prop_assert!(active.len() <= valid.len());
            for assignment in &active {
                prop_assert!(assignment.is_active(now));
                prop_assert!(valid.contains(assignment));
            }
        }

        /// Server and client derive identical ports from the same inputs
        #[test]
        fn both_ends_agree(
            offset in -120i64..120,
            now in 10_000i64..4_000_000_000,
        ) {
            let server = schedule(vec![offset], 15);
            let client = schedule(vec![offset], 15);
            prop_assert_eq!(
                server.port_for(offset, now).unwrap(),
                client.port_for(offset, now).unwrap()
            );
        }
    }
}
