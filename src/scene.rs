// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the collision objects placed in the planning scene before a task starts.

use crate::exception::PickPlaceResult;
use crate::pose::Pose;
use crate::task_config::TaskConfig;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

/// Frame in which all scene objects are expressed.
pub const SCENE_FRAME: &str = "robot_base";
/// Edge length of a cube. Unit: \[m\]
pub const CUBE_SIZE: f64 = 0.05;
/// Edge length of the bucket. Unit: \[m\]
pub const BUCKET_SIZE: f64 = 0.3;
/// Name of the bucket in the scene.
pub const BUCKET_NAME: &str = "bucket";

/// Box shaped collision object.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub frame_id: String,
    pub pose: Pose,
    /// Edge lengths along x, y and z. Unit: \[m\]
    pub size: [f64; 3],
}

impl SceneObject {
    fn cube_box(name: String, pose: Pose, edge: f64) -> Self {
        SceneObject {
            name,
            frame_id: SCENE_FRAME.to_string(),
            pose,
            size: [edge; 3],
        }
    }
}

/// Collision world of the planner.
#[cfg_attr(test, automock)]
pub trait PlanningScene {
    /// Names of all objects currently in the scene.
    fn known_objects(&mut self) -> PickPlaceResult<Vec<String>>;
    fn remove_object(&mut self, name: &str) -> PickPlaceResult<()>;
    /// Adds `object` or replaces an object with the same name.
    fn add_box(&mut self, object: &SceneObject) -> PickPlaceResult<()>;
}

/// Name of the cube with the given index.
pub fn cube_name(index: usize) -> String {
    format!("cube{}", index)
}

fn is_task_object(name: &str) -> bool {
    name == BUCKET_NAME
        || name
            .strip_prefix("cube")
            .map_or(false, |index| index.parse::<usize>().is_ok())
}

/// Objects describing the cubes and the bucket of `config`.
pub fn scene_objects(config: &TaskConfig) -> PickPlaceResult<Vec<SceneObject>> {
    let orientation = config.object_orientation();
    let mut objects = Vec::with_capacity(config.cube_num() + 1);
    for i in 0..config.cube_num() {
        let position = config.cube(i)?;
        objects.push(SceneObject::cube_box(
            cube_name(i),
            Pose::new(position, orientation),
            CUBE_SIZE,
        ));
    }
    objects.push(SceneObject::cube_box(
        BUCKET_NAME.to_string(),
        Pose::new(config.bucket(), orientation),
        BUCKET_SIZE,
    ));
    Ok(objects)
}

/// Replaces the cubes and the bucket in the planning scene with the ones of `config`.
///
/// Objects left behind by an earlier run are removed first. Objects not named like a cube or
/// the bucket stay untouched.
/// # Errors
/// * [`NetworkException`](`crate::exception::PickPlaceException::NetworkException`) if the scene cannot be reached.
/// * [`CommandException`](`crate::exception::PickPlaceException::CommandException`) if the scene rejects an object.
pub fn prepare_scene<S: PlanningScene + ?Sized>(
    scene: &mut S,
    config: &TaskConfig,
) -> PickPlaceResult<()> {
    for name in scene.known_objects()? {
        if is_task_object(&name) {
            debug!("removing stale scene object {}", name);
            scene.remove_object(&name)?;
        }
    }
    let objects = scene_objects(config)?;
    for object in &objects {
        scene.add_box(object)?;
    }
    info!("added {} objects to the planning scene", objects.len());
    Ok(())
}
