//! 关节
//!
//! 关节类型在构建拓扑时一次性展开为 1 自由度的基本轴序列，
//! 运行时只遍历扁平的 `Dof` 列表，不再按关节类型分派。

use glam::DVec3;

/// 自由度运动类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionType {
    /// 绕轴旋转（弧度）
    Rotational,
    /// 沿轴平移
    Translational,
}

/// 关节类型
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JointKind {
    /// 焊接，无自由度
    Weld,
    /// 单轴旋转
    Pin { axis: DVec3 },
    /// 单轴平移
    Slider { axis: DVec3 },
    /// 两轴旋转（先 axis1 后 axis2，体固连）
    Universal { axis1: DVec3, axis2: DVec3 },
    /// 三轴旋转，体固连 X-Y-Z
    Ball,
    /// 三轴平移（父坐标系 X, Y, Z）+ 体固连 X-Y-Z 旋转
    Free,
}

impl JointKind {
    /// 展开为基本轴序列（轴在关节坐标系中，未归一化）
    pub fn primitives(&self) -> Vec<(MotionType, DVec3)> {
        use MotionType::*;
        match *self {
            JointKind::Weld => Vec::new(),
            JointKind::Pin { axis } => vec![(Rotational, axis)],
            JointKind::Slider { axis } => vec![(Translational, axis)],
            JointKind::Universal { axis1, axis2 } => vec![(Rotational, axis1), (Rotational, axis2)],
            JointKind::Ball => vec![
                (Rotational, DVec3::X),
                (Rotational, DVec3::Y),
                (Rotational, DVec3::Z),
            ],
            JointKind::Free => vec![
                (Translational, DVec3::X),
                (Translational, DVec3::Y),
                (Translational, DVec3::Z),
                (Rotational, DVec3::X),
                (Rotational, DVec3::Y),
                (Rotational, DVec3::Z),
            ],
        }
    }

    #[inline]
    pub fn dof_count(&self) -> usize {
        self.primitives().len()
    }
}

/// 单个自由度
#[derive(Clone, Copy, Debug)]
pub struct Dof {
    pub motion: MotionType,
    /// 单位轴（当前关节坐标系）
    pub axis: DVec3,
    /// 对应广义坐标索引
    pub coordinate: usize,
}

/// 关节：连接父刚体与子刚体
#[derive(Clone, Debug)]
pub struct Joint {
    pub name: String,
    /// 父刚体索引
    pub parent: usize,
    /// 子刚体索引
    pub child: usize,
    pub kind: JointKind,
    /// 父质心指向关节点的向量（父体坐标系）
    pub inboard_to_joint: DVec3,
    /// 展开后的自由度
    pub dofs: Vec<Dof>,
}

impl Joint {
    #[inline]
    pub fn dof_count(&self) -> usize {
        self.dofs.len()
    }

    /// 本关节的广义坐标索引
    pub fn coordinates(&self) -> impl Iterator<Item = usize> + '_ {
        self.dofs.iter().map(|d| d.coordinate)
    }
}
