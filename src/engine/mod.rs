//! 动力学引擎
//!
//! 引擎独占拓扑、状态与运动学缓存。每次状态修改后立即重新求值运动学，
//! 查询永远不会读到过期数据。
//!
//! 单步流程：
//! ```text
//! set_state(Y) → begin_loads() → apply_* → compute_accelerations() → 积分器推进 Y
//! ```

mod queries;
mod state;

pub use queries::SystemInertia;

use glam::DVec3;

use crate::collaborators::ModelLoader;
use crate::config::{get_config, EngineConfig};
use crate::contact::ContactResult;
use crate::error::{EngineError, Result};
use crate::kinematics::Kinematics;
use crate::loads::{LoadAccumulator, LoadPhase};
use crate::topology::{Category, ModelBuilder, Topology};

/// 多体动力学引擎
#[derive(Clone, Debug)]
pub struct DynamicsEngine {
    pub(crate) topology: Topology,
    /// 构造时的配置快照
    pub(crate) config: EngineConfig,
    pub(crate) gravity: DVec3,
    pub(crate) time: f64,

    // ========================================
    // 状态
    // ========================================
    pub(crate) q: Vec<f64>,
    pub(crate) u: Vec<f64>,
    /// 最近一次求导得到的广义加速度
    pub(crate) udot: Vec<f64>,
    pub(crate) initial_state: Vec<f64>,
    pub(crate) pseudo: Vec<f64>,
    pub(crate) initial_pseudo: Vec<f64>,
    pub(crate) controls: Vec<f64>,

    // ========================================
    // 缓存
    // ========================================
    pub(crate) kinematics: Kinematics,
    /// 最近一次求导所用的载荷（用于关节反力）
    pub(crate) last_loads: LoadAccumulator,
    pub(crate) contact_results: Vec<ContactResult>,
    pub(crate) contacts_fresh: bool,
}

impl DynamicsEngine {
    /// 从冻结的拓扑创建引擎；坐标取默认值，速度为零
    pub fn new(topology: Topology) -> Self {
        let config = get_config();
        let n = topology.num_coordinates();
        let q: Vec<f64> = topology.coordinates.iter().map(|c| c.default_value).collect();
        let u = vec![0.0; n];
        let udot = vec![0.0; n];
        let pseudo: Vec<f64> = topology.pseudo_states.iter().map(|p| p.default_value).collect();
        let kinematics = Kinematics::evaluate(&topology, &q, &u, &udot);

        log::info!(
            "[Engine] 引擎创建: 刚体={}, 关节={}, 坐标={}, 控制={}, 接触={}",
            topology.num_bodies(),
            topology.num_joints(),
            n,
            topology.num_controls(),
            topology.num_contacts()
        );

        let mut initial_state = q.clone();
        initial_state.extend_from_slice(&u);

        Self {
            gravity: config.gravity,
            time: 0.0,
            initial_state,
            initial_pseudo: pseudo.clone(),
            controls: vec![0.0; topology.num_controls()],
            last_loads: LoadAccumulator::new(topology.num_bodies(), n),
            contact_results: vec![ContactResult::default(); topology.num_contacts()],
            contacts_fresh: false,
            config,
            q,
            u,
            udot,
            pseudo,
            kinematics,
            topology,
        }
    }

    /// 通过外部加载器构建
    pub fn from_loader(loader: &dyn ModelLoader) -> Result<Self> {
        let mut builder = ModelBuilder::new();
        loader.populate(&mut builder)?;
        Ok(Self::new(builder.build()?))
    }

    /// 重新求值运动学；接触结果随之过期
    pub(crate) fn realize(&mut self) {
        self.kinematics = Kinematics::evaluate(&self.topology, &self.q, &self.u, &self.udot);
        self.contacts_fresh = false;
    }

    /// 开启一个空的载荷阶段
    pub fn begin_loads(&mut self) -> LoadPhase<'_> {
        LoadPhase::new(self)
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn kinematics(&self) -> &Kinematics {
        &self.kinematics
    }

    /// 最近一次求导使用的载荷
    #[inline]
    pub fn last_loads(&self) -> &LoadAccumulator {
        &self.last_loads
    }

    pub fn index_of(&self, category: Category, name: &str) -> Option<usize> {
        self.topology.index_of(category, name)
    }

    pub fn name_of(&self, category: Category, index: usize) -> Result<&str> {
        self.topology.name_of(category, index)
    }

    pub fn set_body_name(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        self.topology.set_body_name(index, name)
    }

    // ========================================
    // 重力
    // ========================================

    #[inline]
    pub fn gravity(&self) -> DVec3 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: DVec3) -> Result<()> {
        if !gravity.is_finite() {
            return Err(EngineError::NonFinite("gravity"));
        }
        self.gravity = gravity;
        Ok(())
    }

    // ========================================
    // 连接向量
    // ========================================

    /// 质心 → 内侧关节点（体坐标系）
    pub fn body_to_joint(&self, body: usize) -> Result<DVec3> {
        Ok(self.topology.body(body)?.body_to_joint)
    }

    pub fn set_body_to_joint(&mut self, body: usize, v: DVec3) -> Result<()> {
        self.inboard_joint_of(body)?;
        self.topology.bodies[body].body_to_joint = v;
        self.realize();
        Ok(())
    }

    /// 父质心 → 内侧关节点（父体坐标系）；地面返回零向量
    pub fn inboard_to_joint(&self, body: usize) -> Result<DVec3> {
        Ok(self
            .topology
            .body(body)?
            .inboard_joint
            .map_or(DVec3::ZERO, |j| self.topology.joints[j].inboard_to_joint))
    }

    pub fn set_inboard_to_joint(&mut self, body: usize, v: DVec3) -> Result<()> {
        let joint = self.inboard_joint_of(body)?;
        self.topology.joints[joint].inboard_to_joint = v;
        self.realize();
        Ok(())
    }

    fn inboard_joint_of(&self, body: usize) -> Result<usize> {
        self.topology
            .body(body)?
            .inboard_joint
            .ok_or_else(|| EngineError::invalid_topology("the ground body has no inboard joint"))
    }

    // ========================================
    // 执行器
    // ========================================

    /// 执行器当前作用力
    pub fn actuation(&self, actuator: usize) -> Result<f64> {
        let count = self.topology.actuators.len();
        let actuator = self
            .topology
            .actuators
            .get(actuator)
            .ok_or_else(|| EngineError::index_out_of_range("actuator", actuator, count))?;
        Ok(actuator.actuation(&self.controls))
    }

    /// 设置或清除覆盖作用力
    pub fn override_actuation(&mut self, actuator: usize, value: Option<f64>) -> Result<()> {
        let count = self.topology.actuators.len();
        let actuator = self
            .topology
            .actuators
            .get_mut(actuator)
            .ok_or_else(|| EngineError::index_out_of_range("actuator", actuator, count))?;
        actuator.override_actuation = value;
        Ok(())
    }
}
