//! Loading scenes from a manifest of GeoTIFF band files

use chrono::NaiveDate;
use verdure_core::io::{write_geotiff, GeoTiffOptions, ManifestSource, SceneEntry, SceneManifest};
use verdure_core::{BBox, GeoTransform, ImageSource, Raster, CRS};

fn band(value: u16, origin_x: f64) -> Raster<u16> {
    let mut r = Raster::filled(4, 4, value);
    r.set(0, 0, 0).unwrap();
    r.set_transform(GeoTransform::new(origin_x, 31.0, 0.0001, -0.0001));
    r.set_crs(Some(CRS::wgs84()));
    r
}

fn scene(dir: &std::path::Path, id: &str, datetime: &str, origin_x: f64) -> SceneEntry {
    let scene_dir = dir.join(id);
    std::fs::create_dir_all(&scene_dir).unwrap();
    let mut bands = std::collections::BTreeMap::new();
    for (name, value) in [("B4", 800u16), ("B8", 3200u16)] {
        let path = scene_dir.join(format!("{name}.tif"));
        write_geotiff(&band(value, origin_x), &path, Some(GeoTiffOptions { nodata: Some(0.0) })).unwrap();
        bands.insert(name.to_string(), format!("{id}/{name}.tif").into());
    }
    SceneEntry {
        id: id.to_string(),
        datetime: datetime.to_string(),
        crs: None,
        nodata: None,
        bands,
    }
}

#[test]
fn query_filters_by_date_and_aoi() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = SceneManifest {
        scenes: vec![
            scene(dir.path(), "march", "2024-03-12T07:05:21Z", 48.2),
            scene(dir.path(), "april", "2024-04-02", 48.2),
            scene(dir.path(), "far_away", "2024-03-20", 10.0),
            scene(dir.path(), "november", "2024-11-05", 48.2),
        ],
    };
    let path = dir.path().join("manifest.json");
    std::fs::write(&path, serde_json::to_string_pretty(&manifest).unwrap()).unwrap();

    let source = ManifestSource::open(&path).unwrap();
    let aoi = BBox::new(48.180, 30.859, 48.364, 31.080);
    let found = source
        .query(
            &aoi,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 11, 1).unwrap(),
        )
        .unwrap();

    let ids: Vec<&str> = found.iter().map(|img| img.id()).collect();
    assert_eq!(ids, vec!["march", "april"]);

    let march = found.iter().find(|img| img.id() == "march").unwrap();
    assert_eq!(march.band_names(), vec!["B4", "B8"]);
    let red = march.band("B4").unwrap();
    assert_eq!(red.get(0, 0), None, "file no-data must be masked");
    assert_eq!(red.get(2, 3), Some(800.0));
    assert_eq!(march.crs().and_then(CRS::epsg), Some(4326));
}

#[test]
fn manifest_overrides_nodata() {
    let dir = tempfile::tempdir().unwrap();
    let mut entry = scene(dir.path(), "s", "2024-05-01", 48.2);
    entry.nodata = Some(800.0);
    let source = ManifestSource::new(dir.path(), SceneManifest { scenes: vec![entry.clone()] });

    let image = source.load_scene(&entry).unwrap();
    assert_eq!(image.band("B4").unwrap().valid_count(), 1);
    assert_eq!(image.band("B8").unwrap().valid_count(), 16);
}

#[test]
fn missing_band_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut entry = scene(dir.path(), "s", "2024-05-01", 48.2);
    entry.bands.insert("B11".into(), "s/B11.tif".into());
    let source = ManifestSource::new(dir.path(), SceneManifest { scenes: vec![entry] });
    let aoi = BBox::new(48.0, 30.0, 49.0, 32.0);
    let result = source.query(
        &aoi,
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
    );
    assert!(result.is_err());
}

#[test]
fn quality_bands_ignore_nodata_sentinel() {
    let dir = tempfile::tempdir().unwrap();
    let mut entry = scene(dir.path(), "s", "2024-05-01", 48.2);
    // Clear sky everywhere: every QA60 sample is 0, the same value as the fill
    let mut qa = band(0, 48.2);
    qa.set(1, 1, 1024).unwrap();
    write_geotiff(&qa, dir.path().join("s/QA60.tif"), Some(GeoTiffOptions { nodata: Some(0.0) })).unwrap();
    entry.bands.insert("QA60".into(), "s/QA60.tif".into());
    entry.nodata = Some(0.0);

    let source = ManifestSource::new(dir.path(), SceneManifest { scenes: vec![entry.clone()] });
    let image = source.load_scene(&entry).unwrap();
    let qa = image.band("QA60").unwrap();
    assert_eq!(qa.valid_count(), 16);
    assert_eq!(qa.get(0, 0), Some(0.0));
    assert_eq!(qa.get(1, 1), Some(1024.0));
    assert_eq!(image.band("B4").unwrap().valid_count(), 15);

    // A custom quality band list turns the sentinel back on for QA60
    let source = ManifestSource::new(dir.path(), SceneManifest { scenes: vec![entry.clone()] })
        .with_quality_bands(["SCL"]);
    assert_eq!(source.load_scene(&entry).unwrap().band("QA60").unwrap().valid_count(), 1);
}
