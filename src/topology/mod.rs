//! 拓扑与命名注册表
//!
//! 核心设计思想：
//! - Body / Joint：运动树的静态结构，索引在引擎生命周期内稳定
//! - Coordinate / Speed：广义坐标与广义速度一一对应（numSpeeds == numCoordinates）
//! - NameRegistry：每个类别的 名称 ↔ 索引 双向映射
//! - ModelBuilder：一次性校验并冻结拓扑

mod body;
mod builder;
mod joint;

pub use body::Body;
pub use builder::{
    ActuatorSpec, ConstraintSpec, ContactSpec, JointSpec, ModelBuilder, PseudoStateSpec, RateSpec,
};
pub use joint::{Dof, Joint, JointKind, MotionType};

use std::collections::HashMap;

use bitflags::bitflags;

use crate::actuator::{CoordinateActuator, PseudoState};
use crate::assembly::Constraint;
use crate::contact::ContactPoint;
use crate::error::{EngineError, Result};

// ============================================================================
// 命名类别
// ============================================================================

/// 命名类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Body,
    Joint,
    Coordinate,
    Speed,
    Control,
    /// Y = (Q, U) 中的元素：先坐标名，后速度名
    State,
    PseudoState,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Body,
        Category::Joint,
        Category::Coordinate,
        Category::Speed,
        Category::Control,
        Category::State,
        Category::PseudoState,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Body => "body",
            Category::Joint => "joint",
            Category::Coordinate => "coordinate",
            Category::Speed => "speed",
            Category::Control => "control",
            Category::State => "state",
            Category::PseudoState => "pseudo-state",
        }
    }
}

// ============================================================================
// 广义坐标
// ============================================================================

bitflags! {
    /// 坐标标志位
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct CoordinateFlags: u32 {
        /// 锁定：动力学中保持不动，装配中不调整
        const LOCKED = 1 << 0;
        /// 旋转坐标（弧度）
        const ROTATIONAL = 1 << 1;
    }
}

/// 广义坐标
#[derive(Clone, Debug)]
pub struct Coordinate {
    pub name: String,
    pub index: usize,
    /// 所属关节
    pub joint: usize,
    pub default_value: f64,
    pub flags: CoordinateFlags,
}

impl Coordinate {
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.flags.contains(CoordinateFlags::LOCKED)
    }

    #[inline]
    pub fn is_rotational(&self) -> bool {
        self.flags.contains(CoordinateFlags::ROTATIONAL)
    }

    /// 对应广义速度的名称
    pub fn speed_name(&self) -> String {
        format!("{}_u", self.name)
    }
}

// ============================================================================
// 名称注册表
// ============================================================================

/// 每个类别一张 名称 → 索引 表，索引 → 名称 由有序列表承担
#[derive(Clone, Debug, Default)]
pub(crate) struct NameRegistry {
    names: HashMap<Category, Vec<String>>,
    lookup: HashMap<Category, HashMap<String, usize>>,
}

impl NameRegistry {
    /// 注册一个类别的全部名称；出现重名返回 Err(重名)
    pub(crate) fn register(&mut self, category: Category, names: Vec<String>) -> std::result::Result<(), String> {
        let mut map = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if map.insert(name.clone(), i).is_some() {
                return Err(name.clone());
            }
        }
        self.lookup.insert(category, map);
        self.names.insert(category, names);
        Ok(())
    }

    pub(crate) fn index_of(&self, category: Category, name: &str) -> Option<usize> {
        self.lookup.get(&category)?.get(name).copied()
    }

    pub(crate) fn name_of(&self, category: Category, index: usize) -> Result<&str> {
        let names = self.names.get(&category).map(Vec::as_slice).unwrap_or(&[]);
        names
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| EngineError::index_out_of_range(category.label(), index, names.len()))
    }

    pub(crate) fn count(&self, category: Category) -> usize {
        self.names.get(&category).map_or(0, Vec::len)
    }

    pub(crate) fn rename(&mut self, category: Category, index: usize, name: String) -> Result<()> {
        let count = self.count(category);
        if index >= count {
            return Err(EngineError::index_out_of_range(category.label(), index, count));
        }
        if let Some(existing) = self.index_of(category, &name) {
            if existing != index {
                return Err(EngineError::invalid_topology(format!(
                    "{} name '{}' already used by index {}",
                    category.label(),
                    name,
                    existing
                )));
            }
            return Ok(());
        }
        let (Some(names), Some(map)) = (self.names.get_mut(&category), self.lookup.get_mut(&category)) else {
            return Err(EngineError::index_out_of_range(category.label(), index, 0));
        };
        map.remove(&names[index]);
        map.insert(name.clone(), index);
        names[index] = name;
        Ok(())
    }
}

// ============================================================================
// 拓扑
// ============================================================================

/// 冻结后的模型拓扑
///
/// 结构（索引、父子关系、自由度）在构建后不可变；
/// 数值参数（质量、惯性、连接向量、接触点）可经引擎的 scale / setter 修改。
#[derive(Clone, Debug)]
pub struct Topology {
    pub(crate) bodies: Vec<Body>,
    pub(crate) joints: Vec<Joint>,
    pub(crate) coordinates: Vec<Coordinate>,
    pub(crate) actuators: Vec<CoordinateActuator>,
    pub(crate) pseudo_states: Vec<PseudoState>,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) contacts: Vec<ContactPoint>,
    /// 关节遍历顺序（父先于子）
    pub(crate) order: Vec<usize>,
    /// 从地面到各刚体路径上的广义坐标（升序）
    pub(crate) body_coordinates: Vec<Vec<usize>>,
    pub(crate) registry: NameRegistry,
}

impl Topology {
    // ========================================
    // 数量
    // ========================================

    #[inline]
    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    #[inline]
    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    #[inline]
    pub fn num_coordinates(&self) -> usize {
        self.coordinates.len()
    }

    #[inline]
    pub fn num_speeds(&self) -> usize {
        self.coordinates.len()
    }

    #[inline]
    pub fn num_controls(&self) -> usize {
        self.actuators.len()
    }

    #[inline]
    pub fn num_contacts(&self) -> usize {
        self.contacts.len()
    }

    #[inline]
    pub fn num_states(&self) -> usize {
        2 * self.coordinates.len()
    }

    #[inline]
    pub fn num_pseudo_states(&self) -> usize {
        self.pseudo_states.len()
    }

    pub fn count(&self, category: Category) -> usize {
        self.registry.count(category)
    }

    // ========================================
    // 名称 ↔ 索引
    // ========================================

    /// 名称查找；未命中返回 None（不是错误）
    pub fn index_of(&self, category: Category, name: &str) -> Option<usize> {
        self.registry.index_of(category, name)
    }

    /// 索引取名；越界返回 IndexOutOfRange
    pub fn name_of(&self, category: Category, index: usize) -> Result<&str> {
        self.registry.name_of(category, index)
    }

    // ========================================
    // 访问器
    // ========================================

    #[inline]
    pub fn ground_body_index(&self) -> usize {
        0
    }

    pub fn body(&self, index: usize) -> Result<&Body> {
        self.bodies
            .get(index)
            .ok_or_else(|| EngineError::index_out_of_range("body", index, self.bodies.len()))
    }

    pub fn joint(&self, index: usize) -> Result<&Joint> {
        self.joints
            .get(index)
            .ok_or_else(|| EngineError::index_out_of_range("joint", index, self.joints.len()))
    }

    pub fn coordinate(&self, index: usize) -> Result<&Coordinate> {
        self.coordinates
            .get(index)
            .ok_or_else(|| EngineError::index_out_of_range("coordinate", index, self.coordinates.len()))
    }

    pub fn coordinate_by_name(&self, name: &str) -> Option<&Coordinate> {
        self.index_of(Category::Coordinate, name).map(|i| &self.coordinates[i])
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    pub fn actuators(&self) -> &[CoordinateActuator] {
        &self.actuators
    }

    pub fn pseudo_states(&self) -> &[PseudoState] {
        &self.pseudo_states
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn contacts(&self) -> &[ContactPoint] {
        &self.contacts
    }

    /// 影响该刚体位姿的广义坐标
    pub fn coordinates_affecting(&self, body: usize) -> Result<&[usize]> {
        self.body(body)?;
        Ok(&self.body_coordinates[body])
    }

    pub(crate) fn check_body(&self, index: usize) -> Result<()> {
        self.body(index).map(|_| ())
    }

    pub(crate) fn check_coordinate(&self, index: usize) -> Result<()> {
        self.coordinate(index).map(|_| ())
    }

    /// 重命名刚体（名称唯一）
    pub fn set_body_name(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.registry.rename(Category::Body, index, name.clone())?;
        self.bodies[index].name = name;
        Ok(())
    }
}
