//! The command line handed to the fulfillment executor for one order.

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::config::{CameraConfig, CameraSource, DatasetConfig, RobotConfig};
use crate::menu::MenuItem;

/// Dataset id for `order`: `{namespace}/eval_{order}` with every
/// non-alphanumeric character of the order replaced by `_`.
///
/// ```rust
/// use voice_order::fulfillment::dataset_id;
///
/// assert_eq!(dataset_id("me", "cucumber roll"), "me/eval_cucumber_roll");
/// assert_eq!(dataset_id("me", "tempura (fried shrimp)"), "me/eval_tempura__fried_shrimp_");
/// ```
pub fn dataset_id(namespace: &str, order: &str) -> String {
    let name: String = order
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("{namespace}/eval_{name}")
}

/// Render cameras in the executor's inline mapping syntax:
/// `{top: {type: opencv, index_or_path: 8, width: 640, height: 480, fps: 30}, ...}`.
pub fn render_cameras<'a>(cameras: impl IntoIterator<Item = (&'a String, &'a CameraConfig)>) -> String {
    let mut out = String::from("{");
    for (i, (name, cam)) in cameras.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let source = match &cam.index_or_path {
            CameraSource::Index(n) => n.to_string(),
            CameraSource::Path(p) => p.clone(),
        };
        let _ = write!(
            out,
            "{name}: {{type: {}, index_or_path: {source}, width: {}, height: {}, fps: {}}}",
            cam.kind, cam.width, cam.height, cam.fps
        );
    }
    out.push('}');
    out
}

/// Everything needed to serve one order.  Built fresh per order.
#[derive(Debug, Clone, PartialEq)]
pub struct FulfillmentCommand {
    pub executable: String,
    pub robot_type: String,
    pub robot_port: String,
    pub robot_id: String,
    pub cameras: String,
    pub task: String,
    pub dataset_id: String,
    pub dataset_root: PathBuf,
    pub episode_time_s: u32,
    pub num_episodes: u32,
    pub policy_path: String,
    pub push_to_hub: bool,
    pub display_data: bool,
    pub resume: bool,
}

impl FulfillmentCommand {
    /// Assemble the command for `order` with the given policy location.
    /// `resume` is always `true`.
    pub fn new(
        robot: &RobotConfig,
        dataset: &DatasetConfig,
        order: &MenuItem,
        policy_path: impl Into<String>,
    ) -> Self {
        Self {
            executable: dataset.executable.clone(),
            robot_type: robot.robot_type.clone(),
            robot_port: robot.port.clone(),
            robot_id: robot.id.clone(),
            cameras: render_cameras(&robot.cameras),
            task: dataset.task_template.replace("{order}", order.as_str()),
            dataset_id: dataset_id(&dataset.namespace, order.as_str()),
            dataset_root: dataset.run_root(),
            episode_time_s: dataset.episode_time_s,
            num_episodes: dataset.num_episodes,
            policy_path: policy_path.into(),
            push_to_hub: dataset.push_to_hub,
            display_data: dataset.display_data,
            resume: true,
        }
    }

    /// Directory the executor records this order's dataset into.
    pub fn dataset_dir(&self) -> PathBuf {
        self.dataset_root.join(&self.dataset_id)
    }

    /// Arguments passed to [`executable`](Self::executable), in order.
    pub fn to_args(&self) -> Vec<String> {
        vec![
            format!("--robot.type={}", self.robot_type),
            format!("--robot.port={}", self.robot_port),
            format!("--robot.id={}", self.robot_id),
            format!("--robot.cameras={}", self.cameras),
            format!("--dataset.single_task={}", self.task),
            format!("--dataset.repo_id={}", self.dataset_id),
            format!("--dataset.root={}", self.dataset_root.display()),
            format!("--dataset.episode_time_s={}", self.episode_time_s),
            format!("--dataset.num_episodes={}", self.num_episodes),
            format!("--policy.path={}", self.policy_path),
            format!("--dataset.push_to_hub={}", self.push_to_hub),
            format!("--display_data={}", self.display_data),
            format!("--resume={}", self.resume),
        ]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::menu::Menu;

    fn tuna() -> MenuItem {
        Menu::new(["tuna"]).unwrap().items()[0].clone()
    }

    #[test]
    fn default_cameras_render_inline() {
        assert_eq!(
            render_cameras(&RobotConfig::default().cameras),
            "{top: {type: opencv, index_or_path: 8, width: 640, height: 480, fps: 30}, \
             wrist: {type: opencv, index_or_path: 10, width: 640, height: 480, fps: 30}}"
        );
    }

    #[test]
    fn camera_path_source_is_verbatim() {
        let mut robot = RobotConfig::default();
        robot.cameras.retain(|name, _| name == "top");
        if let Some(top) = robot.cameras.get_mut("top") {
            top.index_or_path = CameraSource::Path("/dev/video2".into());
        }
        assert!(render_cameras(&robot.cameras).contains("index_or_path: /dev/video2,"));
    }

    #[test]
    fn args_follow_executor_order() {
        let dataset = DatasetConfig {
            run_root: Some(PathBuf::from("/data/eval")),
            ..DatasetConfig::default()
        };
        let cmd = FulfillmentCommand::new(
            &RobotConfig::default(),
            &dataset,
            &tuna(),
            "/cache/ServeTunaSushi",
        );
        let args = cmd.to_args();

        assert_eq!(cmd.executable, "lerobot-record");
        assert_eq!(args[0], "--robot.type=so101_follower");
        assert_eq!(args[1], "--robot.port=/dev/ttyACM2");
        assert_eq!(args[2], "--robot.id=my_awsome_follower_arm");
        assert!(args[3].starts_with("--robot.cameras={top: "));
        assert_eq!(args[4], "--dataset.single_task=Serve tuna sushi");
        assert_eq!(args[5], "--dataset.repo_id=your_hf_username/eval_tuna");
        assert_eq!(args[6], "--dataset.root=/data/eval");
        assert_eq!(args[7], "--dataset.episode_time_s=20");
        assert_eq!(args[8], "--dataset.num_episodes=1");
        assert_eq!(args[9], "--policy.path=/cache/ServeTunaSushi");
        assert_eq!(args[10], "--dataset.push_to_hub=false");
        assert_eq!(args[11], "--display_data=true");
        assert_eq!(args[12], "--resume=true");
        assert_eq!(args.len(), 13);
    }

    #[test]
    fn dataset_dir_joins_root_and_id() {
        let dataset = DatasetConfig {
            run_root: Some(PathBuf::from("/data")),
            namespace: "me".into(),
            ..DatasetConfig::default()
        };
        let cmd = FulfillmentCommand::new(&RobotConfig::default(), &dataset, &tuna(), "p");
        assert_eq!(cmd.dataset_dir(), PathBuf::from("/data/me/eval_tuna"));
    }

    #[test]
    fn dataset_id_keeps_unicode_letters() {
        assert_eq!(dataset_id("ns", "tamago-yaki"), "ns/eval_tamago_yaki");
        assert_eq!(dataset_id("ns", "卵"), "ns/eval_卵");
    }
}
