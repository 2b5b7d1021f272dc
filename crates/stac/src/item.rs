use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ledger::SceneRecord;

/// Published catalog document for one registered scene.
///
/// The item id is derived deterministically from the scene id, which is
/// what makes upsert idempotent. Asset hrefs point at the download host
/// (the relay), never at raw storage URLs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CatalogItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub stac_version: String,
    pub id: String,
    pub collection: String,
    pub geometry: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
    pub properties: ItemProperties,
    pub assets: BTreeMap<String, ItemAsset>,
    pub links: Vec<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ItemProperties {
    pub datetime: String,
    pub start_datetime: String,
    pub end_datetime: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ItemAsset {
    pub href: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Build the catalog item for a stored scene.
///
/// Deterministic: the same record and download host always produce the same
/// document, byte for byte.
pub fn build_item(record: &SceneRecord, download_host: &str) -> CatalogItem {
    let host = download_host.trim_end_matches('/');
    let day = record.acquisition_date;

    let assets = record
        .assets
        .iter()
        .map(|asset| {
            let key = record.object_key(asset);
            (
                asset.name.clone(),
                ItemAsset {
                    href: format!("{host}/{key}"),
                    title: Some(asset.name.clone()),
                },
            )
        })
        .collect();

    CatalogItem {
        item_type: "Feature".to_string(),
        stac_version: "1.0.0".to_string(),
        id: record.scene_id.clone(),
        collection: record.dataset.clone(),
        geometry: record.geometry.clone(),
        bbox: record.bbox,
        properties: ItemProperties {
            datetime: format!("{day}T00:00:00Z"),
            start_datetime: format!("{day}T00:00:00Z"),
            end_datetime: format!("{day}T23:59:59Z"),
        },
        assets,
        links: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledger::AssetSpec;

    fn stored_record() -> SceneRecord {
        let mut record = SceneRecord::discovered(
            "LC08_L1TP_192025",
            "landsat_ot_c2_l1",
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        );
        record.assets = vec![
            AssetSpec {
                name: "LC08_L1TP_192025.tar".to_string(),
                remote_ref: "https://dds.example/1".to_string(),
                size: 42,
            },
            AssetSpec {
                name: "LC08_L1TP_192025_MTL.xml".to_string(),
                remote_ref: "https://dds.example/2".to_string(),
                size: 7,
            },
        ];
        record.bbox = Some([14.0, 49.0, 15.0, 50.0]);
        record
    }

    #[test]
    fn item_is_deterministic() {
        let record = stored_record();
        let a = serde_json::to_value(build_item(&record, "http://relay.example:8080/")).unwrap();
        let b = serde_json::to_value(build_item(&record, "http://relay.example:8080/")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hrefs_go_through_the_download_host() {
        let item = build_item(&stored_record(), "http://relay.example:8080/");
        let asset = &item.assets["LC08_L1TP_192025.tar"];
        assert_eq!(
            asset.href,
            "http://relay.example:8080/landsat_ot_c2_l1/LC08_L1TP_192025.tar"
        );
    }

    #[test]
    fn datetime_bounds_cover_the_acquisition_day() {
        let item = build_item(&stored_record(), "http://relay.example:8080");
        assert_eq!(item.properties.start_datetime, "2024-03-05T00:00:00Z");
        assert_eq!(item.properties.end_datetime, "2024-03-05T23:59:59Z");
        assert_eq!(item.id, "LC08_L1TP_192025");
        assert_eq!(item.collection, "landsat_ot_c2_l1");
    }
}
