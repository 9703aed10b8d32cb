//! 多体动力学引擎
//!
//! 核心设计思想：
//! - Topology：刚体、关节、广义坐标的静态结构与名称注册表
//! - DynamicsEngine：状态 Y = (Q, U)、运动学查询、载荷阶段、导数求值
//! - Assembly / Contact：约束装配与接触力
//! - Convert / Storage：姿态表示转换与轨迹缓冲区
//!
//! 积分器不在本 crate 内，引擎只提供状态与导数契约。

pub mod actuator;
pub mod assembly;
pub mod collaborators;
pub mod config;
pub mod contact;
pub mod convert;
pub mod dynamics;
pub mod engine;
pub mod error;
pub mod kinematics;
pub mod loads;
pub mod scale;
pub mod storage;
pub mod topology;

pub use actuator::{CoordinateActuator, PseudoState, PseudoStateModel};
pub use assembly::{AssemblyReport, Constraint};
pub use collaborators::{IkSolver, IkTarget, ModelLoader, Scaler};
pub use config::{get_config, reset_config, set_config, EngineConfig};
pub use contact::{ContactMaterial, ContactPoint, ContactResult};
pub use dynamics::{Derivatives, JointReaction};
pub use engine::{DynamicsEngine, SystemInertia};
pub use error::{EngineError, Result};
pub use kinematics::{BodyKinematics, Kinematics};
pub use loads::{LoadAccumulator, LoadPhase};
pub use scale::{BodyScale, ScaleSet};
pub use storage::{StateRow, Storage};
pub use topology::{
    ActuatorSpec, Body, Category, ConstraintSpec, ContactSpec, Coordinate, CoordinateFlags, Joint, JointKind,
    JointSpec, ModelBuilder, MotionType, RateSpec, Topology,
};
