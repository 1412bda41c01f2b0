use crate::core::units::celsius_to_fahrenheit;
use anyhow::{anyhow, bail, Context};
use csv::ReaderBuilder as CsvReaderBuilder;
use std::io::Read;

// TMY3 files carry site metadata on the first line and column headers on the second
const COLUMN_SITE_ID: usize = 0;
const COLUMN_SITE_NAME: usize = 1;
const COLUMN_LATITUDE: usize = 4;
const COLUMN_LONGITUDE: usize = 5;
const HEADER_AIR_TEMP: &str = "Dry-bulb (C)";

#[derive(Clone, Debug)]
pub struct WeatherFile {
    pub site_id: String,
    pub site_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// hourly dry bulb temperatures, in deg F
    pub air_temperatures: Vec<f64>,
}

pub fn weather_data_to_vec(file: impl Read) -> anyhow::Result<WeatherFile> {
    let mut reader = CsvReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(file);
    let mut records = reader.records();

    let metadata = records
        .next()
        .ok_or_else(|| anyhow!("Weather file is empty"))?
        .context("Could not read weather file site metadata")?;
    let site_id = metadata
        .get(COLUMN_SITE_ID)
        .ok_or_else(|| anyhow!("Weather file metadata has no site id"))?
        .trim()
        .to_string();
    let site_name = metadata
        .get(COLUMN_SITE_NAME)
        .unwrap_or_default()
        .trim()
        .to_string();
    let parse_coordinate =
        |column: usize| metadata.get(column).and_then(|value| value.trim().parse().ok());
    let latitude = parse_coordinate(COLUMN_LATITUDE);
    let longitude = parse_coordinate(COLUMN_LONGITUDE);

    let headers = records
        .next()
        .ok_or_else(|| anyhow!("Weather file has no column headers"))?
        .context("Could not read weather file column headers")?;
    let Some(temperature_column) = headers
        .iter()
        .position(|header| header.trim() == HEADER_AIR_TEMP)
    else {
        bail!("Weather file has no '{HEADER_AIR_TEMP}' column");
    };

    let mut air_temperatures = vec![];
    for (i, result) in records.enumerate() {
        let row = i + 3;
        let record = result.with_context(|| format!("Could not read weather file row {row}"))?;
        let value = record
            .get(temperature_column)
            .ok_or_else(|| anyhow!("Weather file row {row} has no temperature"))?;
        let temperature: f64 = value.trim().parse().with_context(|| {
            format!("Weather file row {row} has an invalid temperature '{value}'")
        })?;
        air_temperatures.push(celsius_to_fahrenheit(temperature));
    }

    Ok(WeatherFile {
        site_id,
        site_name,
        latitude,
        longitude,
        air_temperatures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    const TMY3_EXTRACT: &str = "702730,\"ANCHORAGE INTL AP\",AK,-9.0,61.183,-150.000,35
Date (MM/DD/YYYY),Time (HH:MM),ETR (W/m^2),Dry-bulb (C),Dew-point (C),RHum (%)
01/01/1988,01:00,0,-10.0,-13.0,78
01/01/1988,02:00,0,-11.5,-14.0,80
01/01/1988,03:00,0,20.0,-14.0,81
";

    #[rstest]
    fn should_read_tmy3_temperatures() {
        let weather = weather_data_to_vec(TMY3_EXTRACT.as_bytes()).unwrap();
        assert_eq!(weather.site_id, "702730");
        assert_eq!(weather.site_name, "ANCHORAGE INTL AP");
        assert_eq!(weather.latitude, Some(61.183));
        assert_eq!(weather.longitude, Some(-150.));
        assert_eq!(weather.air_temperatures.len(), 3);
        assert_relative_eq!(weather.air_temperatures[0], 14., max_relative = 1e-9);
        assert_relative_eq!(weather.air_temperatures[1], 11.3, max_relative = 1e-9);
        assert_relative_eq!(weather.air_temperatures[2], 68., max_relative = 1e-9);
    }

    #[rstest]
    fn should_fail_without_temperature_column() {
        let file = "702730,ANCHORAGE,AK,-9.0,61.183,-150.000,35\nDate,Time,ETR\n01/01/1988,01:00,0\n";
        assert!(weather_data_to_vec(file.as_bytes()).is_err());
    }

    #[rstest]
    fn should_fail_on_invalid_temperature() {
        let file = "702730,ANCHORAGE,AK,-9.0,61.183,-150.000,35\nDate,Dry-bulb (C)\n01/01/1988,warm\n";
        let error = weather_data_to_vec(file.as_bytes()).unwrap_err();
        assert!(error.to_string().contains("row 3"));
    }
}
