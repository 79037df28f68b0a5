//! Targets and synthetic injected-signal variants.
//!
//! A synthetic target is a base target plus a box-shaped transit injected
//! before the search. Its parameters travel inside the target id:
//!
//! `<base>_inject-P<period>-R<radius>-T<duration_hr>-E<epoch>`
//!
//! with every decimal point written as `p`, e.g.
//! `kplr006184894_inject-P6p941-R10p1-T2p6-E1p234`.

use crate::error::NameError;
use crate::types::TargetId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::info;

const INJECT_MARKER: &str = "_inject-";

/// Injected-signal parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InjectionParams {
    /// Orbital period in days.
    pub period: f64,
    /// Companion radius in Earth radii.
    pub radius: f64,
    /// Transit duration in hours.
    pub duration_hr: f64,
    /// Reference transit epoch in days.
    pub epoch: f64,
}

/// A subject of analysis. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub base: TargetId,
    pub injection: Option<InjectionParams>,
}

impl Target {
    /// Build a target from its id, decoding injection parameters when present.
    pub fn parse(id: &TargetId) -> Result<Self, NameError> {
        let Some((base, suffix)) = id.as_str().split_once(INJECT_MARKER) else {
            return Ok(Self {
                id: id.clone(),
                base: id.clone(),
                injection: None,
            });
        };
        let base = TargetId::new(base)?;
        let injection = parse_injection(suffix)
            .ok_or_else(|| NameError::InvalidInjection(id.to_string()))?;
        Ok(Self {
            id: id.clone(),
            base,
            injection: Some(injection),
        })
    }

    /// Build a synthetic variant of `base`.
    pub fn synthetic(base: &TargetId, injection: InjectionParams) -> Result<Self, NameError> {
        let id = TargetId::new(format!(
            "{}{}P{}-R{}-T{}-E{}",
            base,
            INJECT_MARKER,
            encode_decimal(injection.period),
            encode_decimal(injection.radius),
            encode_decimal(injection.duration_hr),
            encode_decimal(injection.epoch),
        ))?;
        Ok(Self {
            id,
            base: base.clone(),
            injection: Some(injection),
        })
    }

    pub fn is_synthetic(&self) -> bool {
        self.injection.is_some()
    }
}

/// Sampling ranges for randomized injections.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionRanges {
    pub period: Range<f64>,
    pub radius: Range<f64>,
    pub duration_hr: Range<f64>,
}

impl Default for InjectionRanges {
    fn default() -> Self {
        Self {
            period: 2.0..50.0,
            radius: 1.0..10.0,
            duration_hr: 1.0..6.0,
        }
    }
}

/// Draw randomized injection parameters for `base`.
///
/// Values are rounded so the encoded id stays short; the epoch falls inside
/// the first period. The draw is logged so a run can be reproduced from logs.
pub fn draw_injection<R: Rng + ?Sized>(
    base: &TargetId,
    ranges: &InjectionRanges,
    rng: &mut R,
) -> Result<Target, NameError> {
    let period = round_to(rng.gen_range(ranges.period.clone()), 3);
    let injection = InjectionParams {
        period,
        radius: round_to(rng.gen_range(ranges.radius.clone()), 1),
        duration_hr: round_to(rng.gen_range(ranges.duration_hr.clone()), 1),
        epoch: round_to(rng.gen_range(0.0..period), 3),
    };
    let target = Target::synthetic(base, injection)?;
    info!(
        base = %base,
        target = %target.id,
        period = injection.period,
        radius = injection.radius,
        duration_hr = injection.duration_hr,
        epoch = injection.epoch,
        "Drew injection parameters"
    );
    Ok(target)
}

fn parse_injection(suffix: &str) -> Option<InjectionParams> {
    let mut period = None;
    let mut radius = None;
    let mut duration_hr = None;
    let mut epoch = None;
    for part in suffix.split('-') {
        let mut chars = part.chars();
        let tag = chars.next()?;
        let value = decode_decimal(chars.as_str())?;
        let slot = match tag {
            'P' => &mut period,
            'R' => &mut radius,
            'T' => &mut duration_hr,
            'E' => &mut epoch,
            _ => return None,
        };
        if slot.replace(value).is_some() {
            return None;
        }
    }
    Some(InjectionParams {
        period: period?,
        radius: radius?,
        duration_hr: duration_hr?,
        epoch: epoch?,
    })
}

fn encode_decimal(value: f64) -> String {
    value.to_string().replace('.', "p")
}

fn decode_decimal(raw: &str) -> Option<f64> {
    if raw.is_empty() {
        return None;
    }
    raw.replace('p', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}
