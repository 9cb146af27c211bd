//! Attributes derived from birth details.
//!
//! Only the sun sign is computed. Moon and rising signs need ephemeris data
//! and a birth location, so they are always absent.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::request::BirthDetails;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Element {
    Fire,
    Earth,
    Air,
    Water,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SunSign {
    Capricorn,
    Aquarius,
    Pisces,
    Aries,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
}

/// (sign, first month/day, last month/day). Capricorn wraps the new year.
const SIGN_RANGES: [(SunSign, (u32, u32), (u32, u32)); 12] = [
    (SunSign::Capricorn, (12, 22), (1, 19)),
    (SunSign::Aquarius, (1, 20), (2, 18)),
    (SunSign::Pisces, (2, 19), (3, 20)),
    (SunSign::Aries, (3, 21), (4, 19)),
    (SunSign::Taurus, (4, 20), (5, 20)),
    (SunSign::Gemini, (5, 21), (6, 20)),
    (SunSign::Cancer, (6, 21), (7, 22)),
    (SunSign::Leo, (7, 23), (8, 22)),
    (SunSign::Virgo, (8, 23), (9, 22)),
    (SunSign::Libra, (9, 23), (10, 22)),
    (SunSign::Scorpio, (10, 23), (11, 21)),
    (SunSign::Sagittarius, (11, 22), (12, 21)),
];

impl SunSign {
    pub fn for_date(date: NaiveDate) -> SunSign {
        let md = (date.month(), date.day());
        for (sign, start, end) in SIGN_RANGES {
            let within = if start > end {
                md >= start || md <= end
            } else {
                md >= start && md <= end
            };
            if within {
                return sign;
            }
        }
        // The ranges cover every calendar day.
        SunSign::Capricorn
    }

    pub fn element(&self) -> Element {
        match self {
            SunSign::Aries | SunSign::Leo | SunSign::Sagittarius => Element::Fire,
            SunSign::Taurus | SunSign::Virgo | SunSign::Capricorn => Element::Earth,
            SunSign::Gemini | SunSign::Libra | SunSign::Aquarius => Element::Air,
            SunSign::Cancer | SunSign::Scorpio | SunSign::Pisces => Element::Water,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SunSign::Capricorn => "Capricorn",
            SunSign::Aquarius => "Aquarius",
            SunSign::Pisces => "Pisces",
            SunSign::Aries => "Aries",
            SunSign::Taurus => "Taurus",
            SunSign::Gemini => "Gemini",
            SunSign::Cancer => "Cancer",
            SunSign::Leo => "Leo",
            SunSign::Virgo => "Virgo",
            SunSign::Libra => "Libra",
            SunSign::Scorpio => "Scorpio",
            SunSign::Sagittarius => "Sagittarius",
        }
    }
}

impl core::fmt::Display for SunSign {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl core::fmt::Display for Element {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Element::Fire => "Fire",
            Element::Earth => "Earth",
            Element::Air => "Air",
            Element::Water => "Water",
        };
        f.write_str(name)
    }
}

/// Astrology attributes attached to an artifact and fed into prompts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstrologyProfile {
    pub sun_sign: Option<SunSign>,
    pub element: Option<Element>,
    pub moon_sign: Option<SunSign>,
    pub rising_sign: Option<SunSign>,
    pub birth_date: Option<NaiveDate>,
    pub birth_time: Option<String>,
    pub birth_city: Option<String>,
}

impl AstrologyProfile {
    pub fn derive(birth: &BirthDetails) -> Self {
        let sun_sign = SunSign::for_date(birth.date);
        Self {
            sun_sign: Some(sun_sign),
            element: Some(sun_sign.element()),
            moon_sign: None,
            rising_sign: None,
            birth_date: Some(birth.date),
            birth_time: birth.time.clone(),
            birth_city: birth.city.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn sign_boundaries() {
        assert_eq!(SunSign::for_date(date(1990, 5, 15)), SunSign::Taurus);
        assert_eq!(SunSign::for_date(date(1990, 5, 21)), SunSign::Gemini);
        assert_eq!(SunSign::for_date(date(1990, 12, 21)), SunSign::Sagittarius);
        assert_eq!(SunSign::for_date(date(1990, 12, 22)), SunSign::Capricorn);
        assert_eq!(SunSign::for_date(date(1991, 1, 19)), SunSign::Capricorn);
        assert_eq!(SunSign::for_date(date(1991, 1, 20)), SunSign::Aquarius);
        assert_eq!(SunSign::for_date(date(1992, 2, 29)), SunSign::Pisces);
    }

    #[test]
    fn derive_carries_birth_details() {
        let birth = BirthDetails {
            date: date(1990, 5, 15),
            time: Some("07:45".into()),
            city: None,
        };
        let profile = AstrologyProfile::derive(&birth);
        assert_eq!(profile.sun_sign, Some(SunSign::Taurus));
        assert_eq!(profile.element, Some(Element::Earth));
        assert_eq!(profile.moon_sign, None);
        assert_eq!(profile.birth_time.as_deref(), Some("07:45"));
    }

    proptest! {
        /// Property: every calendar day falls in exactly one sign range.
        #[test]
        fn every_day_has_exactly_one_sign(ordinal in 1u32..=366) {
            let day = NaiveDate::from_yo_opt(2024, ordinal).unwrap();
            let md = (day.month(), day.day());
            let matches = SIGN_RANGES
                .iter()
                .filter(|(_, start, end)| {
                    if start > end { md >= *start || md <= *end } else { md >= *start && md <= *end }
                })
                .count();
            prop_assert_eq!(matches, 1);
        }
    }
}
