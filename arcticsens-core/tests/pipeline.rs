//! End-to-end runs over a small multi-model collection.
//!
//! The models deliberately use different grid conventions:
//! - CESM2: `ni`/`nj` ocean grid with latitude stored as a `lat` data field
//! - MIROC6: `x`/`y` ocean grid with the swapped assignment
//! - NOAREA: like CESM2 but without any cell-area field

use approx::assert_relative_eq;
use arcticsens_core::collection::ModelCollection;
use arcticsens_core::config::AnalysisConfig;
use arcticsens_core::errors::ArcticError;
use arcticsens_core::field::{Attributes, GriddedField, LabeledArray};
use arcticsens_core::pipeline::{ArcticPipeline, PipelineReport, SICONC, SITHICK, TAS};
use arcticsens_core::time::{Month, TimeAxis};
use arcticsens_core::weights::{AreaKind, AreaMatch, CellAreaTable};
use ndarray::{Array1, Array2, ArrayD, IxDyn};
use std::collections::BTreeMap;

const N_YEARS: usize = 4;
const N_TIME: usize = 12 * N_YEARS;
/// latitude-like points
const NLAT: usize = 3;
/// longitude-like points
const NLON: usize = 4;
const LATS: [f64; NLAT] = [72.0, 80.0, 88.0];
/// 100 km² per cell
const CELL_AREA_M2: f64 = 1e8;

fn members() -> Vec<&'static str> {
    vec!["r2i1p1f1", "r1i1p1f1"]
}

fn time() -> TimeAxis {
    TimeAxis::monthly(1980, Month::new(1).unwrap(), N_TIME, None).unwrap()
}

fn year_of(t: usize) -> usize {
    t / 12
}

/// Arctic temperature rises 2 K a year, member r2 runs 0.5 K warm
fn tas() -> GriddedField {
    let values = ArrayD::from_shape_fn(IxDyn(&[2, N_TIME, NLAT, NLON]), |idx| {
        260.0 + 2.0 * year_of(idx[1]) as f64 + if idx[0] == 0 { 0.5 } else { 0.0 }
    });
    let data = LabeledArray::new(vec!["member_id", "time", "lat", "lon"], values)
        .unwrap()
        .with_attrs(Attributes::new().with("units", "K"));
    GriddedField::new(TAS, data)
        .with_coord("lat", LabeledArray::from_1d("lat", Array1::from(LATS.to_vec())))
        .unwrap()
        .with_coord("lon", LabeledArray::from_1d("lon", Array1::linspace(0.0, 270.0, NLON)))
        .unwrap()
        .with_time(time())
        .unwrap()
        .with_members(members())
        .unwrap()
        .with_attrs(Attributes::new().with("table_id", "Amon"))
}

/// The last cell is land
const LAND_CELL: usize = NLAT * NLON - 1;
/// Cells that can hold ice
const OCEAN_CELLS: usize = NLAT * NLON - 1;

/// One more cell loses its ice every year
fn concentration(year: usize, lat_idx: usize, lon_idx: usize) -> f64 {
    let cell = lat_idx * NLON + lon_idx;
    if cell == LAND_CELL {
        f64::NAN
    } else if cell >= year {
        90.0
    } else {
        5.0
    }
}

/// Ocean field on the model's native grid; `lat_dim`/`lon_dim` give the raw names
fn ocean_field(name: &str, lat_dim: &str, lon_dim: &str, value: impl Fn(usize, usize, usize) -> f64) -> GriddedField {
    // stored [lon-like, lat-like] for ni/nj grids, [lat-like, lon-like] for y/x grids
    let lon_first = lat_dim == "ni";
    let shape = if lon_first { [NLON, NLAT] } else { [NLAT, NLON] };
    let values = ArrayD::from_shape_fn(IxDyn(&[2, N_TIME, shape[0], shape[1]]), |idx| {
        let (lat_idx, lon_idx) = if lon_first { (idx[3], idx[2]) } else { (idx[2], idx[3]) };
        value(year_of(idx[1]), lat_idx, lon_idx)
    });
    let grid_dims = if lon_first { [lon_dim, lat_dim] } else { [lat_dim, lon_dim] };
    let lat = Array2::from_shape_fn((shape[0], shape[1]), |(a, b)| LATS[if lon_first { b } else { a }]);

    let data = LabeledArray::new(vec!["member_id", "time", grid_dims[0], grid_dims[1]], values)
        .unwrap()
        .with_attrs(Attributes::new().with("units", if name == SICONC { "%" } else { "m" }));
    GriddedField::new(name, data)
        .with_data_field("lat", LabeledArray::from_2d(grid_dims, lat).unwrap())
        .unwrap()
        .with_time(time())
        .unwrap()
        .with_members(members())
        .unwrap()
        .with_attrs(Attributes::new().with("table_id", "SImon"))
}

fn area_field(lat_dim: &str, lon_dim: &str) -> GriddedField {
    let lon_first = lat_dim == "ni";
    let (dims, shape) = if lon_first {
        ([lon_dim, lat_dim], (NLON, NLAT))
    } else {
        ([lat_dim, lon_dim], (NLAT, NLON))
    };
    let data = LabeledArray::from_2d(dims, Array2::from_elem(shape, CELL_AREA_M2))
        .unwrap()
        .with_attrs(Attributes::new().with("units", "m2"));
    GriddedField::new("areacello", data)
}

fn setup() -> (ModelCollection, CellAreaTable) {
    let grids = [("CESM2", "ni", "nj"), ("MIROC6", "y", "x"), ("NOAREA", "ni", "nj")];
    let mut fields: BTreeMap<String, BTreeMap<String, GriddedField>> = BTreeMap::new();
    let mut areas = CellAreaTable::new();
    for (model, lat_dim, lon_dim) in grids {
        let mut insert = |variable: &str, field: GriddedField| {
            fields
                .entry(variable.to_string())
                .or_default()
                .insert(model.to_string(), field);
        };
        insert(TAS, tas());
        insert(SICONC, ocean_field(SICONC, lat_dim, lon_dim, concentration));
        insert(SITHICK, ocean_field(SITHICK, lat_dim, lon_dim, |_, _, _| 2.0));
        if model != "NOAREA" {
            areas.insert(AreaKind::Ocean, model, area_field(lat_dim, lon_dim));
        }
    }
    // only has temperature, so never enters the collection
    fields
        .get_mut(TAS)
        .unwrap()
        .insert("TAS-ONLY".to_string(), tas());
    (ModelCollection::from_fields(fields), areas)
}

fn run() -> (ModelCollection, PipelineReport) {
    let (collection, areas) = setup();
    let pipeline = ArcticPipeline::new(AnalysisConfig::default()).unwrap();
    let report = pipeline.run(&collection, &areas);
    (collection, report)
}

#[test]
fn test_models_intersected_across_variables() {
    let (collection, _) = setup();
    assert_eq!(
        collection.models().collect::<Vec<_>>(),
        vec!["CESM2", "MIROC6", "NOAREA"]
    );
}

#[test]
fn test_missing_area_skips_only_that_model() {
    let (_, report) = run();
    assert_eq!(report.models.keys().collect::<Vec<_>>(), vec!["CESM2", "MIROC6"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].model, "NOAREA");
    assert_eq!(
        report.skipped[0].reason,
        ArcticError::MissingCellArea {
            model: "NOAREA".to_string()
        }
        .to_string()
    );
}

#[test]
fn test_indices_on_every_grid_convention() {
    let (_, report) = run();
    for model in ["CESM2", "MIROC6"] {
        let result = &report.models[model];
        assert_eq!(result.area_match, AreaMatch::Exact);
        assert_eq!(
            result.members.as_deref(),
            Some(&["r1i1p1f1".to_string(), "r2i1p1f1".to_string()][..])
        );

        let sie = &result.sie_index;
        assert_eq!(sie.name(), "sie_tot_arc");
        assert_eq!(sie.units(), "km2");
        for t in 0..N_TIME {
            let expected = (OCEAN_CELLS - year_of(t)) as f64 * 100.0;
            assert_relative_eq!(sie.values()[[0, t]], expected, max_relative = 1e-12);
        }

        let tas = &result.tas_index;
        // members sorted: r1 is row 0
        assert_relative_eq!(tas.values()[[0, 0]], 260.0, max_relative = 1e-12);
        assert_relative_eq!(tas.values()[[1, 0]], 260.5, max_relative = 1e-12);

        let volume = result.sivol_arc_mean.as_ref().unwrap();
        assert_eq!(volume.units(), "km3");
        assert!(volume.values().iter().all(|v| *v > 0.0));
    }
}

#[test]
fn test_extent_regressed_on_temperature() {
    let (_, report) = run();
    let september = Month::new(9).unwrap();
    for result in report.models.values() {
        let mean = result.regression.mean[&september];
        assert_eq!(mean.count, 2);
        // one 100 km² cell per 2 K
        assert_relative_eq!(mean.slope, -50.0, max_relative = 1e-9);
        assert_relative_eq!(mean.r, -1.0, max_relative = 1e-9);
    }
    let overall = report.multi_model_mean[&september];
    assert_eq!(overall.count, 2);
    assert_relative_eq!(overall.slope, -50.0, max_relative = 1e-9);
}

#[test]
fn test_results_attached_under_new_names() {
    let (mut collection, report) = run();
    report.attach_to(&mut collection).unwrap();

    assert!(collection.field("siextent", "CESM2").is_ok());
    assert!(collection.index("sie_tot_arc", "MIROC6").is_ok());
    assert!(collection.index("tas_arc_mean_anom", "CESM2").is_ok());
    let clim = collection.climatology("sie_tot_arc_clim", "CESM2").unwrap();
    // September climatology over years with 11, 10, 9 and 8 ice-covered cells
    assert_relative_eq!(clim.value(0, Month::new(9).unwrap()), 950.0, max_relative = 1e-12);
    // source variables untouched, skipped model gets nothing
    assert_eq!(collection.field(TAS, "CESM2").unwrap().dims()[0], "member_id");
    assert!(collection.index("sie_tot_arc", "NOAREA").is_err());

    // attaching twice would overwrite
    assert!(matches!(
        report.attach_to(&mut collection),
        Err(ArcticError::DuplicateVariable { .. })
    ));
}

#[test]
fn test_land_cells_stay_null() {
    let (_, report) = run();
    let extent = report.models["MIROC6"].siextent.data().values();
    // MIROC6 stores [member, time, lat-like, lon-like]
    assert!(extent[[0, 0, NLAT - 1, NLON - 1]].is_nan());
    assert_eq!(extent[[0, 0, 0, 0]], 1.0);
    assert!(report.models["MIROC6"].sie_index.values().iter().all(|v| !v.is_nan()));
}

#[test]
fn test_report_round_trips_with_null_cells() {
    let (_, report) = run();
    let bytes = bincode::serialize(&report).unwrap();
    let restored: PipelineReport = bincode::deserialize(&bytes).unwrap();
    // NaN != NaN, so compare the encodings
    assert_eq!(bincode::serialize(&restored).unwrap(), bytes);
    assert_eq!(restored.skipped, report.skipped);
    assert_eq!(restored.models.keys().collect::<Vec<_>>(), report.models.keys().collect::<Vec<_>>());
    assert!(restored.models["CESM2"].siextent.data().values().iter().any(|v| v.is_nan()));
}
