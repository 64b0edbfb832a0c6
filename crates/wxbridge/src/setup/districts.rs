use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::weather::AdminCode;

type Cities = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Error)]
pub enum DistrictTableError {
    #[error("Failed to read district table '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("District table '{}' has no usable rows", .path.display())]
    Empty { path: PathBuf },
}

/// Province → city → district → `district_id`, loaded from the upstream district CSV.
///
/// Columns: `district_id,province,city,city_geocode,district,district_geocode,lon,lat`.
/// Only the first five are read.
#[derive(Debug, Default, Clone)]
pub struct DistrictTable {
    provinces: BTreeMap<String, Cities>,
}

impl DistrictTable {
    pub fn from_file(path: &Path) -> Result<Self, DistrictTableError> {
        let content = std::fs::read_to_string(path).map_err(|source| DistrictTableError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let table = Self::parse(&content);
        if table.is_empty() {
            return Err(DistrictTableError::Empty {
                path: path.to_path_buf(),
            });
        }
        debug!(
            "Loaded {} districts in {} provinces from {}",
            table.len(),
            table.provinces.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse CSV text. The first line is a header and fixes the column count.
    ///
    /// Cells are split on every comma, so a quoted cell containing a comma is not
    /// supported. Such a row has more cells than the header and is skipped, as are
    /// rows with fewer cells and rows without an id, province or district.
    pub fn parse(content: &str) -> Self {
        let mut provinces: BTreeMap<String, Cities> = BTreeMap::new();
        let mut lines = content.lines();
        let columns = lines.next().map_or(0, |header| header.split(',').count());
        if columns < 5 {
            return Self { provinces };
        }

        for (index, line) in lines.enumerate() {
            let row: Vec<&str> = line
                .split(',')
                .map(|cell| cell.trim().trim_matches('"').trim())
                .collect();
            if row.len() != columns {
                if !line.trim().is_empty() {
                    debug!(line = index + 2, cells = row.len(), columns, "Skipping district row");
                }
                continue;
            }
            let (district_id, province, city, district) = (row[0], row[1], row[2], row[4]);
            if district_id.is_empty() || province.is_empty() || district.is_empty() {
                continue;
            }

            provinces
                .entry(province.to_string())
                .or_default()
                .entry(city.to_string())
                .or_default()
                .insert(district.to_string(), district_id.to_string());
        }

        Self { provinces }
    }

    pub fn is_empty(&self) -> bool {
        self.provinces.is_empty()
    }

    /// Number of districts.
    pub fn len(&self) -> usize {
        self.provinces
            .values()
            .flat_map(|cities| cities.values())
            .map(BTreeMap::len)
            .sum()
    }

    pub fn provinces(&self) -> Vec<&str> {
        self.provinces.keys().map(String::as_str).collect()
    }

    pub fn cities(&self, province: &str) -> Option<Vec<&str>> {
        let cities = self.provinces.get(province)?;
        Some(cities.keys().map(String::as_str).collect())
    }

    pub fn districts(&self, province: &str, city: &str) -> Option<Vec<&str>> {
        let districts = self.provinces.get(province)?.get(city)?;
        Some(districts.keys().map(String::as_str).collect())
    }

    pub fn lookup(&self, province: &str, city: &str, district: &str) -> Option<AdminCode> {
        let district_id = self.provinces.get(province)?.get(city)?.get(district)?;
        Some(AdminCode {
            province: province.to_string(),
            city: city.to_string(),
            district: district.to_string(),
            district_id: district_id.clone(),
        })
    }
}

#[cfg(test)]
pub(crate) const SAMPLE: &str = "\
district_id,province,city,city_geocode,district,district_geocode,lon,lat
110101,北京市,北京市,110100,东城区,110101,116.41637,39.92855
110108,北京市,北京市,110100,海淀区,110108,116.29812,39.95931
310115,上海市,上海市,310100,浦东新区,310115,121.54423,31.22114
440305,广东省,深圳市,440300,南山区,440305,113.93029,22.53291
440106,广东省,广州市,440100,天河区,440106,113.36112,23.12467
999999,,,,,,,
440999,广东省,
\"440304\",\"广东省\",\"深圳市\",\"440300\",\"福田区\",\"440304\",114.05571,22.52245
";

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_parse_builds_nested_table() {
        let table = DistrictTable::parse(SAMPLE);
        assert_eq!(table.len(), 6);
        assert_eq!(table.provinces(), vec!["上海市", "北京市", "广东省"]);
        assert_eq!(table.cities("广东省").unwrap(), vec!["广州市", "深圳市"]);
        assert_eq!(
            table.districts("广东省", "深圳市").unwrap(),
            vec!["南山区", "福田区"]
        );
        assert!(table.cities("河北省").is_none());
        assert!(table.districts("北京市", "天津市").is_none());
    }

    #[test]
    fn test_lookup() {
        let table = DistrictTable::parse(SAMPLE);
        let code = table.lookup("北京市", "北京市", "海淀区").unwrap();
        assert_eq!(code.district_id, "110108");
        assert_eq!(code.district, "海淀区");
        assert_eq!(
            table.lookup("广东省", "深圳市", "福田区").unwrap().district_id,
            "440304"
        );
        assert!(table.lookup("北京市", "北京市", "朝阳区").is_none());
    }

    #[test]
    fn test_rows_with_wrong_cell_count_are_skipped() {
        let csv = "\
district_id,province,city,city_geocode,district
110101,北京市,北京市,110100,东城区
110102,北京市,北京市,110100,\"西城区, 旧\"
110105,北京市,北京市,110100,朝阳区,extra
";
        let table = DistrictTable::parse(csv);
        assert_eq!(table.len(), 1);
        assert_eq!(table.districts("北京市", "北京市").unwrap(), vec!["东城区"]);
    }

    #[test]
    fn test_narrow_header_yields_nothing() {
        let table = DistrictTable::parse("id,name\n110101,东城区\n");
        assert!(table.is_empty());
    }

    #[test]
    fn test_header_only_is_empty() {
        let table = DistrictTable::parse("district_id,province,city,city_geocode,district\n");
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let table = DistrictTable::from_file(file.path()).unwrap();
        assert_eq!(table.len(), 6);

        let mut empty = NamedTempFile::new().unwrap();
        writeln!(empty, "district_id,province,city,city_geocode,district").unwrap();
        assert!(matches!(
            DistrictTable::from_file(empty.path()),
            Err(DistrictTableError::Empty { .. })
        ));
        assert!(matches!(
            DistrictTable::from_file(Path::new("/nonexistent/districts.csv")),
            Err(DistrictTableError::Io { .. })
        ));
    }
}
