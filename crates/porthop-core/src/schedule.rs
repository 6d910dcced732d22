//! Port derivation and the set of currently valid ports.
//!
//! Both ends of a link run the same computation: for each configured offset,
//! align `now + offset` to its period, feed the aligned start to the code
//! generator and reduce the code into the port range. Nothing is exchanged
//! between the peers; agreement follows from the shared secret and clock.

use crate::error::{DeriveError, Result};
use crate::totp::TotpGenerator;
use crate::window::TimeWindow;

/// Highest port number plus one
const PORT_SPACE: u32 = 65_536;

/// A derived port together with the window it is valid in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortAssignment {
    /// Port to listen on / dial
    pub port: u16,
    /// Window the port belongs to
    pub window: TimeWindow,
}

impl PortAssignment {
    /// Probe offset of the underlying window
    #[must_use]
    pub fn offset(&self) -> i64 {
        self.window.offset
    }

    /// Whether the assignment is active at `t`
    #[must_use]
    pub fn is_active(&self, t: i64) -> bool {
        self.window.is_active(t)
    }
}

/// Offset of the port inside the range for the period containing `time`.
///
/// # Errors
///
/// Returns [`DeriveError::InvalidRange`] for an empty range and propagates
/// generator failures.
pub fn derive_offset(
    totp: &TotpGenerator,
    time: i64,
    period: u32,
    port_range: u16,
) -> Result<u16> {
    if port_range == 0 {
        return Err(DeriveError::InvalidRange {
            base_port: 0,
            port_range,
        });
    }

    let code = totp.code(time, period)?;
    Ok((code % u32::from(port_range)) as u16)
}

/// Absolute port for the period containing `time`.
///
/// `time` should already be a window start; the result is the same for any
/// instant of that period.
///
/// # Errors
///
/// Returns [`DeriveError::InvalidRange`] if the range is empty or would reach
/// past port 65535, and propagates generator failures.
pub fn derive_port(
    totp: &TotpGenerator,
    time: i64,
    period: u32,
    base_port: u16,
    port_range: u16,
) -> Result<u16> {
    if port_range == 0 || u32::from(base_port) + u32::from(port_range) > PORT_SPACE {
        return Err(DeriveError::InvalidRange {
            base_port,
            port_range,
        });
    }

    let offset = derive_offset(totp, time, period, port_range)?;
    Ok(base_port + offset)
}

/// Parameters of a rotation schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleParams {
    /// Rotation period in seconds
    pub period: u32,
    /// Validity extension on each side of a period, in seconds
    pub extension: u32,
    /// First port of the range
    pub base_port: u16,
    /// Number of ports in the range
    pub port_range: u16,
    /// Probe offsets, in dial order
    pub offsets: Vec<i64>,
}

/// Port schedule shared by server and client.
#[derive(Debug, Clone)]
pub struct PortSchedule {
    totp: TotpGenerator,
    params: ScheduleParams,
}

impl PortSchedule {
    /// Create a schedule.
    ///
    /// # Errors
    ///
    /// Returns [`DeriveError::InvalidRange`] for an unusable port range and a
    /// code generation error for a zero period.
    pub fn new(totp: TotpGenerator, params: ScheduleParams) -> Result<Self> {
        if params.port_range == 0
            || params.base_port == 0
            || u32::from(params.base_port) + u32::from(params.port_range) > PORT_SPACE
        {
            return Err(DeriveError::InvalidRange {
                base_port: params.base_port,
                port_range: params.port_range,
            });
        }
        if params.period == 0 {
            return Err(crate::error::CodeGenerationError::ZeroPeriod.into());
        }

        Ok(Self { totp, params })
    }

    /// Schedule parameters
    #[must_use]
    pub fn params(&self) -> &ScheduleParams {
        &self.params
    }

    /// Configured offsets, in dial order
    #[must_use]
    pub fn offsets(&self) -> &[i64] {
        &self.params.offsets
    }

    /// Derive the assignment for a single offset at `now`.
    ///
    /// # Errors
    ///
    /// Propagates derivation failures.
    pub fn port_for(&self, offset: i64, now: i64) -> Result<PortAssignment> {
        let window = TimeWindow::compute(offset, self.params.period, self.params.extension, now);
        let port = derive_port(
            &self.totp,
            window.window_start,
            self.params.period,
            self.params.base_port,
            self.params.port_range,
        )?;

        Ok(PortAssignment { port, window })
    }

    /// One assignment per configured offset, in configured order.
    ///
    /// An offset whose derivation fails is logged and skipped.
    #[must_use]
    pub fn valid_ports(&self, now: i64) -> Vec<PortAssignment> {
        compute_valid_ports(
            &self.params.offsets,
            self.params.extension,
            self.params.base_port,
            self.params.port_range,
            &self.totp,
            self.params.period,
            now,
        )
    }

    /// Assignments whose window is active at `now`
    #[must_use]
    pub fn active_ports(&self, now: i64) -> Vec<PortAssignment> {
        self.valid_ports(now)
            .into_iter()
            .filter(|a| a.is_active(now))
            .collect()
    }

    /// Whether `port` belongs to a window that is active at `now`
    #[must_use]
    pub fn is_port_active(&self, port: u16, now: i64) -> bool {
        self.active_ports(now).iter().any(|a| a.port == port)
    }
}

/// Compute the assignment of every offset at `now`.
///
/// Order follows `offsets`. Failed derivations are skipped without aborting
/// the remaining offsets.
#[must_use]
pub fn compute_valid_ports(
    offsets: &[i64],
    extension: u32,
    base_port: u16,
    port_range: u16,
    totp: &TotpGenerator,
    period: u32,
    now: i64,
) -> Vec<PortAssignment> {
    let mut ports = Vec::with_capacity(offsets.len());

    for &offset in offsets {
        if period == 0 {
            tracing::warn!("Skipping offset {}: period is zero", offset);
            continue;
        }
        if now.checked_add(offset).is_none() {
            tracing::warn!("Skipping offset {}: too far from {}", offset, now);
            continue;
        }

        let window = TimeWindow::compute(offset, period, extension, now);
        match derive_port(totp, window.window_start, period, base_port, port_range) {
            Ok(port) => ports.push(PortAssignment { port, window }),
            Err(e) => {
                tracing::warn!("Skipping offset {}: {}", offset, e);
            }
        }
    }

    ports
}
