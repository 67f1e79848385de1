use std::fmt;

pub const BASE_YEAR: u16 = 2016;

// CPI fixed index, 1980 = 100. 2021 is the January to August average.
const CPI: [(u16, f64); 6] = [
    (2016, 316.43),
    (2017, 322.11),
    (2018, 328.40),
    (2019, 334.26),
    (2020, 335.92),
    (2021, 340.70),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedYear(pub u16);

impl fmt::Display for UnsupportedYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "year {} is outside the supported range {}-{}",
            self.0,
            CPI[0].0,
            CPI[CPI.len() - 1].0
        )
    }
}

impl std::error::Error for UnsupportedYear {}

pub fn cpi(year: u16) -> Option<f64> {
    CPI.iter().find(|(y, _)| *y == year).map(|(_, index)| *index)
}

/// Rescale `value` observed in `year` by `cpi[year] / cpi[BASE_YEAR]`.
pub fn inflation_adjust(value: f64, year: u16) -> Result<f64, UnsupportedYear> {
    let index = cpi(year).ok_or(UnsupportedYear(year))?;
    if year == BASE_YEAR {
        return Ok(value);
    }
    let base = cpi(BASE_YEAR).ok_or(UnsupportedYear(BASE_YEAR))?;
    Ok(value * index / base)
}

pub fn round_to_tenth(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
