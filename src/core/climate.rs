use crate::core::units::{month_for_hour_of_year, HOURS_PER_DAY, HOURS_PER_YEAR};
use crate::statistics::{percentile, weighted_percentile};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// This module provides the climate profile of a location: a year (or several
/// whole years) of outdoor temperatures, either as hourly values or as
/// temperature bins with hour counts.

/// Tolerance (in hours) used when checking that pre-binned data covers whole years.
const BIN_HOURS_TOLERANCE: f64 = 1e-6;

/// Percentile of hourly temperatures conventionally used as the heating design temperature.
const DESIGN_TEMPERATURE_PERCENTILE: usize = 1;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
struct ClimateSample {
    /// outdoor dry bulb temperature, in deg F
    pub temperature: f64,
    /// duration weight, in hours
    pub hours: f64,
    /// calendar month (1-12), where known
    pub month: Option<u8>,
    /// index of the day this sample belongs to, for hourly data
    day: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TemperatureBin {
    /// bin centre temperature, in deg F
    pub temperature: f64,
    pub hours: f64,
}

/// How finely the year is resolved when it is handed to the dispatch simulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resolution {
    #[default]
    Hourly,
    /// fixed-width temperature bins (width in deg F), kept separate per month where months are known
    Binned { width: f64 },
}

/// One step of the year as seen by the dispatch simulator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClimateStep {
    pub temperature: f64,
    pub hours: f64,
    pub month: Option<u8>,
    /// false when the heat pump has been switched off for this step by the user's
    /// low temperature cutoff
    pub heat_pump_allowed: bool,
}

#[derive(Clone, Debug)]
pub struct ClimateProfile {
    samples: Vec<ClimateSample>,
    years: u32,
    hourly: bool,
}

impl ClimateProfile {
    /// Build a profile from an hourly temperature series (deg F) starting on 1 January.
    /// The series must cover a whole number of non-leap years.
    pub fn from_hourly(temperatures: &[f64]) -> Result<Self, ClimateError> {
        let hours_per_year = HOURS_PER_YEAR as usize;
        if temperatures.is_empty() || temperatures.len() % hours_per_year != 0 {
            return Err(ClimateError::IncompleteYear {
                hours: temperatures.len() as f64,
            });
        }
        if let Some((idx, _)) = temperatures.iter().find_position(|t| !t.is_finite()) {
            return Err(ClimateError::NonFiniteTemperature { index: idx });
        }

        let samples = temperatures
            .iter()
            .enumerate()
            .map(|(hour, temperature)| ClimateSample {
                temperature: *temperature,
                hours: 1.,
                month: Some(month_for_hour_of_year(hour)),
                day: Some(hour / HOURS_PER_DAY as usize),
            })
            .collect();

        Ok(Self {
            samples,
            years: (temperatures.len() / hours_per_year) as u32,
            hourly: true,
        })
    }

    /// Build a profile from pre-binned data. Hours must sum to a whole number of years.
    pub fn from_bins(bins: &[TemperatureBin]) -> Result<Self, ClimateError> {
        if let Some((idx, _)) = bins
            .iter()
            .find_position(|bin| !bin.temperature.is_finite() || !bin.hours.is_finite())
        {
            return Err(ClimateError::NonFiniteTemperature { index: idx });
        }
        if let Some(bin) = bins.iter().find(|bin| bin.hours < 0.) {
            return Err(ClimateError::NegativeHours {
                temperature: bin.temperature,
                hours: bin.hours,
            });
        }

        let total_hours: f64 = bins.iter().map(|bin| bin.hours).sum();
        let years = (total_hours / HOURS_PER_YEAR as f64).round();
        if years < 1. || (total_hours - years * HOURS_PER_YEAR as f64).abs() > BIN_HOURS_TOLERANCE
        {
            return Err(ClimateError::IncompleteYear { hours: total_hours });
        }

        Ok(Self {
            samples: bins
                .iter()
                .map(|bin| ClimateSample {
                    temperature: bin.temperature,
                    hours: bin.hours,
                    month: None,
                    day: None,
                })
                .collect(),
            years: years as u32,
            hourly: false,
        })
    }

    pub fn years(&self) -> u32 {
        self.years
    }

    pub fn is_hourly(&self) -> bool {
        self.hourly
    }

    pub fn total_hours(&self) -> f64 {
        self.samples.iter().map(|sample| sample.hours).sum()
    }

    /// Collapse the profile into fixed-width temperature bins, coldest first.
    ///
    /// Each sample's whole weight is assigned to the nearest bin centre (a multiple
    /// of `width`), ties going to the warmer bin, so no hours are lost.
    pub fn bins(&self, width: f64) -> Result<Vec<TemperatureBin>, ClimateError> {
        Ok(bin_samples(self.samples.iter(), width)?
            .into_iter()
            .map(|(temperature, hours)| TemperatureBin { temperature, hours })
            .collect())
    }

    /// As `bins`, but kept separate for each month. Profiles without month
    /// information produce a single group keyed by None.
    pub fn monthly_bins(
        &self,
        width: f64,
    ) -> Result<Vec<(Option<u8>, Vec<TemperatureBin>)>, ClimateError> {
        let by_month = self
            .samples
            .iter()
            .into_group_map_by(|sample| sample.month)
            .into_iter()
            .sorted_by_key(|(month, _)| *month)
            .collect_vec();

        by_month
            .into_iter()
            .map(|(month, samples)| {
                let bins = bin_samples(samples.into_iter(), width)?
                    .into_iter()
                    .map(|(temperature, hours)| TemperatureBin { temperature, hours })
                    .collect();
                Ok((month, bins))
            })
            .collect()
    }

    /// The steps the dispatch simulator walks through.
    ///
    /// With a low temperature cutoff, the heat pump is switched off for the whole
    /// day whenever that day's minimum temperature is not above the cutoff (hourly
    /// resolution), or for bins whose temperature is not above it (binned).
    pub fn time_steps(
        &self,
        resolution: Resolution,
        low_temp_cutoff: Option<f64>,
    ) -> Result<Vec<ClimateStep>, ClimateError> {
        match resolution {
            Resolution::Hourly => {
                let daily_minimums = self.daily_minimums();
                Ok(self
                    .samples
                    .iter()
                    .map(|sample| {
                        let heat_pump_allowed = match low_temp_cutoff {
                            None => true,
                            Some(cutoff) => {
                                let lowest = sample
                                    .day
                                    .and_then(|day| daily_minimums.get(&day).copied())
                                    .unwrap_or(sample.temperature);
                                lowest > cutoff
                            }
                        };
                        ClimateStep {
                            temperature: sample.temperature,
                            hours: sample.hours,
                            month: sample.month,
                            heat_pump_allowed,
                        }
                    })
                    .collect())
            }
            Resolution::Binned { width } => Ok(self
                .monthly_bins(width)?
                .into_iter()
                .flat_map(|(month, bins)| {
                    bins.into_iter().map(move |bin| ClimateStep {
                        temperature: bin.temperature,
                        hours: bin.hours,
                        month,
                        heat_pump_allowed: low_temp_cutoff
                            .map_or(true, |cutoff| bin.temperature > cutoff),
                    })
                })
                .collect()),
        }
    }

    /// The 1% design temperature, in deg F.
    pub fn design_temperature(&self) -> f64 {
        if self.hourly {
            let temperatures = self
                .samples
                .iter()
                .map(|sample| sample.temperature)
                .collect_vec();
            percentile(&temperatures, DESIGN_TEMPERATURE_PERCENTILE)
        } else {
            let weighted = self
                .samples
                .iter()
                .map(|sample| (sample.temperature, sample.hours))
                .collect_vec();
            weighted_percentile(&weighted, DESIGN_TEMPERATURE_PERCENTILE as f64 / 100.)
                .unwrap_or(f64::NAN)
        }
    }

    fn daily_minimums(&self) -> BTreeMap<usize, f64> {
        let mut minimums: BTreeMap<usize, f64> = BTreeMap::new();
        for sample in &self.samples {
            if let Some(day) = sample.day {
                minimums
                    .entry(day)
                    .and_modify(|lowest| *lowest = lowest.min(sample.temperature))
                    .or_insert(sample.temperature);
            }
        }
        minimums
    }
}

fn bin_samples<'a>(
    samples: impl Iterator<Item = &'a ClimateSample>,
    width: f64,
) -> Result<Vec<(f64, f64)>, ClimateError> {
    if !(width.is_finite() && width > 0.) {
        return Err(ClimateError::InvalidBinWidth(width));
    }

    // integer bin indices keep bin keys exact and the ordering deterministic
    let mut bins: BTreeMap<i64, f64> = BTreeMap::new();
    for sample in samples {
        let index = (sample.temperature / width + 0.5).floor() as i64;
        *bins.entry(index).or_default() += sample.hours;
    }

    Ok(bins
        .into_iter()
        .map(|(index, hours)| (index as f64 * width, hours))
        .collect())
}

#[derive(Debug, Error)]
pub enum ClimateError {
    #[error("Climate data must cover whole years of 8760 hours, but {hours} hours were supplied")]
    IncompleteYear { hours: f64 },
    #[error("Climate data contained a non-finite value at position {index}")]
    NonFiniteTemperature { index: usize },
    #[error("Temperature bin at {temperature} deg F had a negative hour count ({hours})")]
    NegativeHours { temperature: f64, hours: f64 },
    #[error("Temperature bin width must be a positive number, got {0}")]
    InvalidBinWidth(f64),
}
