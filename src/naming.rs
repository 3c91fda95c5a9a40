use chrono::{Local, NaiveDateTime};

/// Fixed-width local timestamp used in every filename, seconds resolution
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always reports the same instant
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

pub fn timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Relative location of one shot: folder components plus filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShotName {
    pub folders: Vec<String>,
    pub filename: String,
}

impl ShotName {
    /// `{ts}_{primary}[_{sub}][_{size}sq].png`
    pub fn single(timestamp: &str, primary: &str, sub: Option<&str>, square_size: Option<u32>) -> Self {
        let mut filename = stem(timestamp, primary, sub);
        if let Some(size) = square_size {
            filename.push_str(&format!("_{}sq", size));
        }
        filename.push_str(".png");
        Self { folders: folders(primary, sub), filename }
    }

    /// `{ts}_{primary}[_{sub}]_{seq:03}.png`, seq starts at 1
    pub fn burst_frame(timestamp: &str, primary: &str, sub: Option<&str>, seq: u32) -> Self {
        let filename = format!("{}_{:03}.png", stem(timestamp, primary, sub), seq);
        Self { folders: folders(primary, sub), filename }
    }

    /// `primary/sub/filename`, for status messages
    pub fn logical_path(&self) -> String {
        let mut parts = self.folders.clone();
        parts.push(self.filename.clone());
        parts.join("/")
    }

    /// Folder structure folded into one filename for the download fallback
    pub fn flattened(&self) -> String {
        format!("{}_{}", self.folders.join("_"), self.filename)
    }
}

fn stem(timestamp: &str, primary: &str, sub: Option<&str>) -> String {
    match sub {
        Some(sub) => format!("{}_{}_{}", timestamp, primary, sub),
        None => format!("{}_{}", timestamp, primary),
    }
}

fn folders(primary: &str, sub: Option<&str>) -> Vec<String> {
    let mut parts = vec![primary.to_string()];
    if let Some(sub) = sub {
        parts.push(sub.to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_timestamp_is_fixed_width() {
        assert_eq!(timestamp(at(9, 5, 1)), "20240307_090501");
        assert_eq!(timestamp(at(23, 59, 59)), "20240307_235959");
    }

    #[test]
    fn test_single_with_sub_and_size() {
        let name = ShotName::single("20240307_090501", "Snyders", Some("D"), Some(512));
        assert_eq!(name.folders, vec!["Snyders", "D"]);
        assert_eq!(name.filename, "20240307_090501_Snyders_D_512sq.png");
        assert_eq!(name.logical_path(), "Snyders/D/20240307_090501_Snyders_D_512sq.png");
        assert_eq!(name.flattened(), "Snyders_D_20240307_090501_Snyders_D_512sq.png");
    }

    #[test]
    fn test_single_native() {
        let name = ShotName::single("20240307_090501", "Big Lot", None, None);
        assert_eq!(name.filename, "20240307_090501_Big Lot.png");
        assert_eq!(name.flattened(), "Big Lot_20240307_090501_Big Lot.png");
    }

    #[test]
    fn test_burst_sequence_padding() {
        let first = ShotName::burst_frame("20240307_090501", "C Press", None, 1);
        let tenth = ShotName::burst_frame("20240307_090501", "C Press", None, 10);
        assert_eq!(first.filename, "20240307_090501_C Press_001.png");
        assert_eq!(tenth.filename, "20240307_090501_C Press_010.png");
    }

    #[test]
    fn test_same_second_same_name() {
        let clock = FixedClock(at(12, 0, 0));
        let a = ShotName::single(&timestamp(clock.now()), "Big Lot", None, Some(224));
        let b = ShotName::single(&timestamp(clock.now()), "Big Lot", None, Some(224));
        assert_eq!(a, b);
    }
}
