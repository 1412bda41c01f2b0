use crate::core::backup::BackupError;
use crate::core::building::LoadModelError;
use crate::core::climate::ClimateError;
use crate::core::dispatch::DispatchError;
use crate::core::economics::EconomicsError;
use crate::core::electric_rate::RateError;
use crate::core::heat_pump::CurveError;
use crate::library::LibraryError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HpCalcError {
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error("Invalid climate data: {0}")]
    Climate(#[from] ClimateError),
    #[error("Could not build building load model: {0}")]
    LoadModel(#[from] LoadModelError),
    #[error(transparent)]
    Curve(#[from] CurveError),
    #[error("Invalid backup heating system: {0}")]
    Backup(#[from] BackupError),
    #[error("Error identified during dispatch simulation: {0}")]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Rate(#[from] RateError),
    #[error(transparent)]
    Economics(#[from] EconomicsError),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Broad category of a calculation failure, for callers that report errors
/// without inspecting their detail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    DataUnavailable,
    InvalidClimateData,
    InsufficientData,
    ImplausibleBalancePoint,
    InvalidCurve,
    EnergyBalance,
    InvalidInput,
}

impl HpCalcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Library(LibraryError::DataUnavailable { .. }) => ErrorKind::DataUnavailable,
            Self::Library(LibraryError::InvalidClimate(_)) | Self::Climate(_) => {
                ErrorKind::InvalidClimateData
            }
            Self::Library(LibraryError::InvalidHeatPump(_))
            | Self::Curve(_)
            | Self::Dispatch(DispatchError::Curve(_)) => ErrorKind::InvalidCurve,
            Self::LoadModel(
                LoadModelError::InsufficientData { .. }
                | LoadModelError::UnidentifiableBalancePoint { .. },
            ) => ErrorKind::InsufficientData,
            Self::LoadModel(LoadModelError::ImplausibleBalancePoint { .. }) => {
                ErrorKind::ImplausibleBalancePoint
            }
            Self::Dispatch(DispatchError::EnergyBalance { .. }) => ErrorKind::EnergyBalance,
            Self::LoadModel(_)
            | Self::Backup(_)
            | Self::Rate(_)
            | Self::Economics(_)
            | Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn should_classify_errors() {
        let unavailable: HpCalcError = LibraryError::DataUnavailable {
            kind: "fuel",
            id: "peat".into(),
        }
        .into();
        assert_eq!(unavailable.kind(), ErrorKind::DataUnavailable);
        assert_eq!(unavailable.to_string(), "No fuel data available for 'peat'");

        let insufficient: HpCalcError = LoadModelError::InsufficientData {
            supplied: 3,
            required: 6,
        }
        .into();
        assert_eq!(insufficient.kind(), ErrorKind::InsufficientData);
        assert_eq!(insufficient.kind().to_string(), "insufficient_data");

        let winter_only: HpCalcError = LoadModelError::UnidentifiableBalancePoint {
            balance_point: 50.,
            warmest_temperature: 50.,
        }
        .into();
        assert_eq!(winter_only.kind(), ErrorKind::InsufficientData);

        let curve: HpCalcError = CurveError::InvalidCurve("empty".into()).into();
        assert_eq!(curve.kind(), ErrorKind::InvalidCurve);
    }
}
