// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the [`TaskConfig`] type and its loader.
//!
//! The task is described by a flat parameter set:
//! ```yaml
//! cube_bucket_orientRPY: [0.0, 0.0, 0.0]
//! bucket_XYZ: [0.6, -0.3, 0.75]
//! cube_num: 1
//! cube0_XYZ: [0.4, 0.2, 0.75]
//! # optional
//! table_height: 0.75
//! min_plan_fraction: 1.0
//! gripper_close_fraction: 0.7
//! gripper_open_fraction: 0.005
//! ```
//! Keys are matched case-insensitively. The height of every cube and of the bucket is replaced
//! by the table height, objects always rest on the table.

use crate::exception::{create_configuration_error, PickPlaceResult};
use crate::utils::rpy_to_quaternion;
use ::config::{Config, FileFormat, Value};
use nalgebra::{Point2, Point3, UnitQuaternion};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Height of the table surface the cubes and the bucket rest on. Unit: \[m\]
pub const DEFAULT_TABLE_HEIGHT: f64 = 0.75;
/// Gripper fraction used for grasping a cube.
pub const DEFAULT_GRIPPER_CLOSE_FRACTION: f64 = 0.7;
/// Gripper fraction used for releasing a cube.
pub const DEFAULT_GRIPPER_OPEN_FRACTION: f64 = 0.005;
/// Minimum planned path fraction a stage accepts.
pub const DEFAULT_MIN_PLAN_FRACTION: f64 = 1.0;

/// Immutable description of one pick-and-place task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskConfig {
    table_height: f64,
    orientation: UnitQuaternion<f64>,
    cubes: Vec<Point2<f64>>,
    bucket: Point3<f64>,
    min_plan_fraction: f64,
    gripper_close_fraction: f64,
    gripper_open_fraction: f64,
}

impl TaskConfig {
    /// Creates a task configuration with default tuning.
    ///
    /// # Arguments
    /// * `table_height` - Height of the table surface. \[m\]
    /// * `orientation_rpy` - Roll, pitch and yaw shared by all cubes and the bucket. \[rad\]
    /// * `cubes` - XY position of every cube. \[m\]
    /// * `bucket` - XY position of the bucket. \[m\]
    pub fn new(
        table_height: f64,
        orientation_rpy: [f64; 3],
        cubes: Vec<[f64; 2]>,
        bucket: [f64; 2],
    ) -> Self {
        TaskConfig {
            table_height,
            orientation: rpy_to_quaternion(&orientation_rpy),
            cubes: cubes.iter().map(|c| Point2::new(c[0], c[1])).collect(),
            bucket: Point3::new(bucket[0], bucket[1], table_height),
            min_plan_fraction: DEFAULT_MIN_PLAN_FRACTION,
            gripper_close_fraction: DEFAULT_GRIPPER_CLOSE_FRACTION,
            gripper_open_fraction: DEFAULT_GRIPPER_OPEN_FRACTION,
        }
    }

    /// Replaces the minimum accepted plan fraction.
    /// # Errors
    /// * [`ConfigurationError`](`crate::exception::PickPlaceException::ConfigurationError`) if the fraction is not within \[0, 1\].
    pub fn with_min_plan_fraction(mut self, fraction: f64) -> PickPlaceResult<Self> {
        self.min_plan_fraction = unit_interval("min_plan_fraction", fraction)?;
        Ok(self)
    }

    /// Replaces the gripper fractions used for grasping and releasing.
    /// # Errors
    /// * [`ConfigurationError`](`crate::exception::PickPlaceException::ConfigurationError`) if a fraction is not within \[0, 1\].
    pub fn with_gripper_fractions(mut self, close: f64, open: f64) -> PickPlaceResult<Self> {
        self.gripper_close_fraction = unit_interval("gripper_close_fraction", close)?;
        self.gripper_open_fraction = unit_interval("gripper_open_fraction", open)?;
        Ok(self)
    }

    /// Loads the task configuration from a file. The format is derived from the file extension.
    /// # Errors
    /// * [`ConfigurationError`](`crate::exception::PickPlaceException::ConfigurationError`) if the file cannot be read
    /// or a required key is missing or malformed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> PickPlaceResult<Self> {
        let settings = Config::builder()
            .add_source(::config::File::from(path.as_ref()))
            .build()?;
        TaskConfig::from_settings(settings)
    }

    /// Loads the task configuration from a string in the given format.
    pub fn parse(content: &str, format: FileFormat) -> PickPlaceResult<Self> {
        let settings = Config::builder()
            .add_source(::config::File::from_str(content, format))
            .build()?;
        TaskConfig::from_settings(settings)
    }

    fn from_settings(settings: Config) -> PickPlaceResult<Self> {
        let raw: HashMap<String, Value> = settings.try_deserialize()?;
        let params = Parameters {
            values: raw
                .into_iter()
                .map(|(key, value)| (key.to_lowercase(), value))
                .collect(),
        };

        let orientation_rpy = params.required_triple("cube_bucket_orientRPY")?;
        let bucket = params.required_triple("bucket_XYZ")?;
        let cube_num = params.required_count("cube_num")?;
        let table_height = params
            .optional_float("table_height")?
            .unwrap_or(DEFAULT_TABLE_HEIGHT);
        let mut cubes = Vec::with_capacity(cube_num);
        for i in 0..cube_num {
            let xyz = params.required_triple(&format!("cube{}_XYZ", i))?;
            cubes.push([xyz[0], xyz[1]]);
        }
        let config = TaskConfig::new(table_height, orientation_rpy, cubes, [bucket[0], bucket[1]])
            .with_min_plan_fraction(
                params
                    .optional_float("min_plan_fraction")?
                    .unwrap_or(DEFAULT_MIN_PLAN_FRACTION),
            )?
            .with_gripper_fractions(
                params
                    .optional_float("gripper_close_fraction")?
                    .unwrap_or(DEFAULT_GRIPPER_CLOSE_FRACTION),
                params
                    .optional_float("gripper_open_fraction")?
                    .unwrap_or(DEFAULT_GRIPPER_OPEN_FRACTION),
            )?;
        debug!("loaded task configuration with {} cube(s)", cube_num);
        Ok(config)
    }

    pub fn table_height(&self) -> f64 {
        self.table_height
    }

    /// Orientation shared by all cubes and the bucket.
    pub fn object_orientation(&self) -> UnitQuaternion<f64> {
        self.orientation
    }

    pub fn cube_num(&self) -> usize {
        self.cubes.len()
    }

    /// Resting position of a cube on the table.
    /// # Errors
    /// * [`ConfigurationError`](`crate::exception::PickPlaceException::ConfigurationError`) if there is no cube with this index.
    pub fn cube(&self, index: usize) -> PickPlaceResult<Point3<f64>> {
        self.cubes
            .get(index)
            .map(|c| Point3::new(c.x, c.y, self.table_height))
            .ok_or_else(|| {
                create_configuration_error(format!(
                    "cube index {} is out of range, {} cube(s) configured",
                    index,
                    self.cubes.len()
                ))
            })
    }

    /// Resting position of the bucket on the table.
    pub fn bucket(&self) -> Point3<f64> {
        self.bucket
    }

    pub fn min_plan_fraction(&self) -> f64 {
        self.min_plan_fraction
    }

    pub fn gripper_close_fraction(&self) -> f64 {
        self.gripper_close_fraction
    }

    pub fn gripper_open_fraction(&self) -> f64 {
        self.gripper_open_fraction
    }
}

struct Parameters {
    values: HashMap<String, Value>,
}

impl Parameters {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(&key.to_lowercase()).cloned()
    }

    fn required(&self, key: &str) -> PickPlaceResult<Value> {
        self.get(key)
            .ok_or_else(|| create_configuration_error(format!("missing parameter {}", key)))
    }

    fn required_triple(&self, key: &str) -> PickPlaceResult<[f64; 3]> {
        let values = self.required(key)?.into_array().map_err(|e| {
            create_configuration_error(format!("parameter {} is not a list: {}", key, e))
        })?;
        if values.len() != 3 {
            return Err(create_configuration_error(format!(
                "parameter {} needs 3 values but has {}",
                key,
                values.len()
            )));
        }
        let mut out = [0.; 3];
        for (slot, value) in out.iter_mut().zip(values.into_iter()) {
            *slot = value.into_float().map_err(|e| {
                create_configuration_error(format!("parameter {} is malformed: {}", key, e))
            })?;
        }
        Ok(out)
    }

    fn required_count(&self, key: &str) -> PickPlaceResult<usize> {
        let count = self.required(key)?.into_int().map_err(|e| {
            create_configuration_error(format!("parameter {} is not an integer: {}", key, e))
        })?;
        if count < 0 {
            return Err(create_configuration_error(format!(
                "parameter {} must not be negative but is {}",
                key, count
            )));
        }
        Ok(count as usize)
    }

    fn optional_float(&self, key: &str) -> PickPlaceResult<Option<f64>> {
        self.get(key)
            .map(|value| {
                value.into_float().map_err(|e| {
                    create_configuration_error(format!("parameter {} is malformed: {}", key, e))
                })
            })
            .transpose()
    }
}

fn unit_interval(name: &str, value: f64) -> PickPlaceResult<f64> {
    if (0. ..=1.).contains(&value) {
        Ok(value)
    } else {
        Err(create_configuration_error(format!(
            "{} must be within [0, 1] but is {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use crate::task_config::{TaskConfig, DEFAULT_GRIPPER_CLOSE_FRACTION, DEFAULT_TABLE_HEIGHT};
    use crate::exception::PickPlaceException;
    use crate::utils::quaternion_to_array;
    use ::config::FileFormat;

    const SCENARIO: &str = "
cube_bucket_orientRPY: [0.0, 0.0, 0.0]
bucket_XYZ: [0.6, -0.3, 1.2]
cube_num: 2
cube0_XYZ: [0.4, 0.2, 0.0]
cube1_XYZ: [0.5, 0.1, 3.0]
";

    fn expect_configuration_error(result: Result<TaskConfig, PickPlaceException>) {
        match result {
            Err(PickPlaceException::ConfigurationError { .. }) => {}
            other => panic!("expected configuration error but found {:?}", other),
        }
    }

    #[test]
    fn loads_scenario_with_defaults() {
        let config = TaskConfig::parse(SCENARIO, FileFormat::Yaml).unwrap();
        assert_eq!(config.cube_num(), 2);
        assert_eq!(config.table_height(), DEFAULT_TABLE_HEIGHT);
        assert_eq!(config.min_plan_fraction(), 1.0);
        assert_eq!(config.gripper_close_fraction(), DEFAULT_GRIPPER_CLOSE_FRACTION);
        let cube = config.cube(1).unwrap();
        assert_eq!((cube.x, cube.y, cube.z), (0.5, 0.1, DEFAULT_TABLE_HEIGHT));
        let bucket = config.bucket();
        assert_eq!((bucket.x, bucket.y, bucket.z), (0.6, -0.3, DEFAULT_TABLE_HEIGHT));
        let q = quaternion_to_array(&config.object_orientation());
        assert!((q[3] - 1.).abs() < 1e-12);
    }

    #[test]
    fn optional_keys_override_defaults() {
        let content = format!(
            "{}table_height: 0.8\nmin_plan_fraction: 0.9\ngripper_close_fraction: 0.6\n",
            SCENARIO
        );
        let config = TaskConfig::parse(&content, FileFormat::Yaml).unwrap();
        assert_eq!(config.table_height(), 0.8);
        assert_eq!(config.cube(0).unwrap().z, 0.8);
        assert_eq!(config.min_plan_fraction(), 0.9);
        assert_eq!(config.gripper_close_fraction(), 0.6);
    }

    #[test]
    fn integer_coordinates_are_accepted() {
        let content = "
cube_bucket_orientRPY: [0, 0, 0]
bucket_XYZ: [1, 0, 0]
cube_num: 1
cube0_XYZ: [0, 1, 0]
";
        let config = TaskConfig::parse(content, FileFormat::Yaml).unwrap();
        assert_eq!(config.cube(0).unwrap().y, 1.0);
    }

    #[test]
    fn zero_cubes_is_a_valid_shape() {
        let content = "
cube_bucket_orientRPY: [0.0, 0.0, 0.0]
bucket_XYZ: [0.6, -0.3, 0.75]
cube_num: 0
";
        let config = TaskConfig::parse(content, FileFormat::Yaml).unwrap();
        assert_eq!(config.cube_num(), 0);
        match config.cube(0) {
            Err(PickPlaceException::ConfigurationError { .. }) => {}
            other => panic!("expected configuration error but found {:?}", other),
        }
    }

    #[test]
    fn missing_cube_is_rejected() {
        let content = "
cube_bucket_orientRPY: [0.0, 0.0, 0.0]
bucket_XYZ: [0.6, -0.3, 0.75]
cube_num: 2
cube0_XYZ: [0.4, 0.2, 0.75]
";
        expect_configuration_error(TaskConfig::parse(content, FileFormat::Yaml));
    }

    #[test]
    fn missing_bucket_is_rejected() {
        let content = "
cube_bucket_orientRPY: [0.0, 0.0, 0.0]
cube_num: 0
";
        expect_configuration_error(TaskConfig::parse(content, FileFormat::Yaml));
    }

    #[test]
    fn short_triple_is_rejected() {
        let content = "
cube_bucket_orientRPY: [0.0, 0.0]
bucket_XYZ: [0.6, -0.3, 0.75]
cube_num: 0
";
        expect_configuration_error(TaskConfig::parse(content, FileFormat::Yaml));
    }

    #[test]
    fn negative_cube_count_is_rejected() {
        let content = "
cube_bucket_orientRPY: [0.0, 0.0, 0.0]
bucket_XYZ: [0.6, -0.3, 0.75]
cube_num: -1
";
        expect_configuration_error(TaskConfig::parse(content, FileFormat::Yaml));
    }

    #[test]
    fn fraction_outside_unit_interval_is_rejected() {
        let config = TaskConfig::new(0.75, [0.; 3], vec![[0.4, 0.2]], [0.6, -0.3]);
        expect_configuration_error(config.clone().with_min_plan_fraction(1.5));
        expect_configuration_error(config.with_gripper_fractions(0.7, -0.1));
    }

    #[test]
    fn toml_is_supported() {
        let content = "
cube_bucket_orientRPY = [0.0, 0.0, 0.0]
bucket_XYZ = [0.6, -0.3, 0.75]
cube_num = 1
cube0_XYZ = [0.4, 0.2, 0.75]
";
        let config = TaskConfig::parse(content, FileFormat::Toml).unwrap();
        assert_eq!(config.cube(0).unwrap().x, 0.4);
    }
}
