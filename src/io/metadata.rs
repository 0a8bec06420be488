//! Sentinel-2 product metadata parsing.
//!
//! Reads the fields the pipeline filters on (sensing time, cloudy-pixel
//! percentage, footprint, platform) from `MTD_MSIL2A.xml`. Primary
//! parsing walks the XML event stream; a regex scan over the raw text
//! serves as fallback for documents with unexpected namespacing.

use crate::types::{
    BoundingBox, CoordinateSystem, EngineError, EngineResult, SceneMetadata,
};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

/// Tags read from the product metadata document
const PRODUCT_URI_TAG: &str = "PRODUCT_URI";
const START_TIME_TAG: &str = "PRODUCT_START_TIME";
const DATATAKE_TIME_TAG: &str = "DATATAKE_SENSING_START";
const SPACECRAFT_TAG: &str = "SPACECRAFT_NAME";
const CLOUD_TAG: &str = "Cloud_Coverage_Assessment";
const FOOTPRINT_TAG: &str = "EXT_POS_LIST";

/// Parse product-level metadata from `MTD_MSIL2A.xml` content.
///
/// `fallback_id` (usually the product directory name) is used when the
/// document carries no `PRODUCT_URI`.
pub fn parse_product_metadata(xml: &str, fallback_id: &str) -> EngineResult<SceneMetadata> {
    log::debug!(
        "Parsing product metadata for {} ({} bytes)",
        fallback_id,
        xml.len()
    );

    let product_id = extract_tag_text(xml, PRODUCT_URI_TAG)
        .map(|uri| uri.trim_end_matches(".SAFE").to_string())
        .unwrap_or_else(|| fallback_id.to_string());

    let sensing_time_str = extract_tag_text(xml, START_TIME_TAG)
        .or_else(|| extract_tag_text(xml, DATATAKE_TIME_TAG))
        .ok_or_else(|| {
            EngineError::Metadata(format!("No sensing time in metadata for {}", product_id))
        })?;
    let sensing_time = parse_time_flexible(&sensing_time_str)?;

    let cloud_cover_percentage = extract_tag_text(xml, CLOUD_TAG)
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| {
            EngineError::Metadata(format!(
                "No cloud coverage assessment in metadata for {}",
                product_id
            ))
        })?;

    let platform = extract_tag_text(xml, SPACECRAFT_TAG)
        .unwrap_or_else(|| "Sentinel-2A".to_string());

    let bounding_box = extract_tag_text(xml, FOOTPRINT_TAG)
        .and_then(|list| parse_footprint(&list))
        .ok_or_else(|| {
            EngineError::Metadata(format!("No product footprint in metadata for {}", product_id))
        })?;

    Ok(SceneMetadata {
        product_id,
        mission: "Sentinel-2".to_string(),
        platform,
        sensing_time,
        cloud_cover_percentage,
        bounding_box,
        coordinate_system: CoordinateSystem::Geographic,
    })
}

/// Text content of the first element with the given local name.
/// Event-stream walk first, regex scan as fallback.
fn extract_tag_text(xml: &str, tag: &str) -> Option<String> {
    match extract_tag_text_events(xml, tag) {
        Some(text) if !text.is_empty() => Some(text),
        _ => extract_tag_text_regex(xml, tag),
    }
}

fn extract_tag_text_events(xml: &str, tag: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    let mut inside = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name();
                let local = name.local_name();
                if local.as_ref() == tag.as_bytes() {
                    inside = true;
                }
            }
            Ok(Event::Text(e)) if inside => {
                return e.unescape().ok().map(|t| t.trim().to_string());
            }
            Ok(Event::End(_)) if inside => {
                // Element closed without text content
                return None;
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
    }
}

/// Regex fallback handling tags with attributes or namespace prefixes
fn extract_tag_text_regex(xml: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"<(?:[\w.]+:)?{}\s*[^>]*>\s*([^<]*)\s*</(?:[\w.]+:)?{}>", tag, tag);
    if let Ok(re) = Regex::new(&pattern) {
        if let Some(cap) = re.captures(xml) {
            return Some(cap[1].trim().to_string());
        }
    }
    None
}

/// Flexible time parsing that handles the timestamp formats seen in
/// Sentinel-2 product metadata
pub fn parse_time_flexible(time_str: &str) -> EngineResult<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(time_str) {
        return Ok(time.with_timezone(&Utc));
    }

    // Fractional seconds with a literal Z
    if let Ok(time) = DateTime::parse_from_str(time_str, "%Y-%m-%dT%H:%M:%S%.fZ") {
        return Ok(time.with_timezone(&Utc));
    }

    // Explicit UTC offset
    if let Ok(time) = DateTime::parse_from_str(time_str, "%Y-%m-%dT%H:%M:%S%.f+00:00") {
        return Ok(time.with_timezone(&Utc));
    }

    // No zone designator at all (some granule metadata)
    if let Ok(naive) =
        chrono::NaiveDateTime::parse_from_str(time_str, "%Y-%m-%dT%H:%M:%S%.f")
    {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
    }

    Err(EngineError::Metadata(format!(
        "Unparseable sensing time: {}",
        time_str
    )))
}

/// Parse an `EXT_POS_LIST` lat/lon ring into its bounding box
fn parse_footprint(pos_list: &str) -> Option<BoundingBox> {
    let values: Vec<f64> = pos_list
        .split_whitespace()
        .filter_map(|v| v.parse::<f64>().ok())
        .collect();
    if values.len() < 4 || values.len() % 2 != 0 {
        return None;
    }

    let mut min_x = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    // The ring is lat lon lat lon ...
    for pair in values.chunks(2) {
        let (lat, lon) = (pair[0], pair[1]);
        min_x = min_x.min(lon);
        max_x = max_x.max(lon);
        min_y = min_y.min(lat);
        max_y = max_y.max(lat);
    }

    Some(BoundingBox {
        min_x,
        max_x,
        min_y,
        max_y,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    const SAMPLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<n1:Level-2A_User_Product xmlns:n1="https://psd-14.sentinel2.eo.esa.int/PSD/User_Product_Level-2A.xsd">
  <n1:General_Info>
    <Product_Info>
      <PRODUCT_START_TIME>2019-03-04T08:01:21.024Z</PRODUCT_START_TIME>
      <PRODUCT_URI>S2A_MSIL2A_20190304T080121_N0211_R035_T36JUT_20190304T120000.SAFE</PRODUCT_URI>
      <Datatake>
        <SPACECRAFT_NAME>Sentinel-2A</SPACECRAFT_NAME>
      </Datatake>
    </Product_Info>
    <Product_Footprint>
      <EXT_POS_LIST>-25.1 30.7 -25.1 31.0 -24.8 31.0 -24.8 30.7 -25.1 30.7</EXT_POS_LIST>
    </Product_Footprint>
  </n1:General_Info>
  <n1:Quality_Indicators_Info>
    <Cloud_Coverage_Assessment>7.352</Cloud_Coverage_Assessment>
  </n1:Quality_Indicators_Info>
</n1:Level-2A_User_Product>"#;

    #[test]
    fn test_parse_product_metadata() {
        let metadata = parse_product_metadata(SAMPLE_XML, "fallback").unwrap();
        assert_eq!(
            metadata.product_id,
            "S2A_MSIL2A_20190304T080121_N0211_R035_T36JUT_20190304T120000"
        );
        assert_eq!(metadata.platform, "Sentinel-2A");
        assert!((metadata.cloud_cover_percentage - 7.352).abs() < 1e-9);
        assert_eq!(metadata.sensing_time.year(), 2019);
        assert_eq!(metadata.sensing_time.month(), 3);

        let bbox = metadata.bounding_box;
        assert!((bbox.min_x - 30.7).abs() < 1e-9);
        assert!((bbox.max_x - 31.0).abs() < 1e-9);
        assert!((bbox.min_y - -25.1).abs() < 1e-9);
        assert!((bbox.max_y - -24.8).abs() < 1e-9);
    }

    #[test]
    fn test_missing_cloud_assessment_is_error() {
        let xml = SAMPLE_XML.replace("Cloud_Coverage_Assessment", "Something_Else");
        assert!(parse_product_metadata(&xml, "fallback").is_err());
    }

    #[test]
    fn test_time_formats() {
        assert!(parse_time_flexible("2019-03-04T08:01:21.024Z").is_ok());
        assert!(parse_time_flexible("2019-03-04T08:01:21Z").is_ok());
        assert!(parse_time_flexible("2019-03-04T08:01:21.024+00:00").is_ok());
        assert!(parse_time_flexible("2019-03-04T08:01:21.024").is_ok());
        assert!(parse_time_flexible("not a time").is_err());
    }

    #[test]
    fn test_regex_fallback_handles_prefixed_tags() {
        let xml = "<n1:Cloud_Coverage_Assessment>12.5</n1:Cloud_Coverage_Assessment>";
        assert_eq!(
            extract_tag_text_regex(xml, "Cloud_Coverage_Assessment").as_deref(),
            Some("12.5")
        );
    }
}
