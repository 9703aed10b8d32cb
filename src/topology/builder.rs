//! 模型构建器
//!
//! 外部加载器（文件、文档节点）通过 ModelBuilder 填充拓扑，
//! `build()` 一次性完成全部校验并冻结索引。

use std::collections::{HashMap, HashSet, VecDeque};

use glam::{DMat3, DVec3};

use super::{Body, Category, Coordinate, CoordinateFlags, Dof, Joint, JointKind, MotionType, NameRegistry, Topology};
use crate::actuator::{CoordinateActuator, PseudoState, PseudoStateModel};
use crate::assembly::Constraint;
use crate::contact::{ContactMaterial, ContactPoint};
use crate::error::{EngineError, Result};

/// 关节定义
#[derive(Clone, Debug)]
pub struct JointSpec {
    pub name: String,
    pub parent: String,
    pub child: String,
    pub kind: JointKind,
    /// 父质心 → 关节点（父体坐标系）
    pub inboard_to_joint: DVec3,
    /// 子质心 → 关节点（子体坐标系）
    pub body_to_joint: DVec3,
    /// 每个自由度一个坐标名
    pub coordinates: Vec<String>,
}

impl JointSpec {
    pub fn new(
        name: impl Into<String>,
        parent: impl Into<String>,
        child: impl Into<String>,
        kind: JointKind,
    ) -> Self {
        Self {
            name: name.into(),
            parent: parent.into(),
            child: child.into(),
            kind,
            inboard_to_joint: DVec3::ZERO,
            body_to_joint: DVec3::ZERO,
            coordinates: Vec::new(),
        }
    }

    pub fn inboard_to_joint(mut self, v: DVec3) -> Self {
        self.inboard_to_joint = v;
        self
    }

    pub fn body_to_joint(mut self, v: DVec3) -> Self {
        self.body_to_joint = v;
        self
    }

    pub fn coordinates<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.coordinates = names.into_iter().map(Into::into).collect();
        self
    }
}

/// 坐标执行器定义
#[derive(Clone, Debug)]
pub struct ActuatorSpec {
    pub name: String,
    pub coordinate: String,
    pub optimal_force: f64,
    pub min_control: f64,
    pub max_control: f64,
}

impl ActuatorSpec {
    pub fn new(name: impl Into<String>, coordinate: impl Into<String>, optimal_force: f64) -> Self {
        Self {
            name: name.into(),
            coordinate: coordinate.into(),
            optimal_force,
            min_control: f64::NEG_INFINITY,
            max_control: f64::INFINITY,
        }
    }

    pub fn control_range(mut self, min: f64, max: f64) -> Self {
        self.min_control = min;
        self.max_control = max;
        self
    }
}

/// 伪状态变化率模型（按控制名引用）
#[derive(Clone, Debug)]
pub enum RateSpec {
    Activation {
        control: String,
        activation_time: f64,
        deactivation_time: f64,
    },
    ControlIntegrator {
        control: String,
    },
    Constant,
}

/// 伪状态定义
#[derive(Clone, Debug)]
pub struct PseudoStateSpec {
    pub name: String,
    pub default_value: f64,
    pub rate: RateSpec,
}

/// 装配约束定义（按名称引用）
#[derive(Clone, Debug)]
pub enum ConstraintSpec {
    /// dependent = scale * independent + offset
    CoordinateCoupler {
        dependent: String,
        independent: String,
        scale: f64,
        offset: f64,
    },
    /// 两刚体上的点重合（闭环）
    PointOnPoint {
        body_a: String,
        point_a: DVec3,
        body_b: String,
        point_b: DVec3,
    },
}

/// 接触点对定义
#[derive(Clone, Debug)]
pub struct ContactSpec {
    pub body_a: String,
    pub point_a: DVec3,
    pub body_b: String,
    pub point_b: DVec3,
    /// 接触法向（body A 坐标系）
    pub normal: DVec3,
    pub material: ContactMaterial,
}

/// 模型构建器
#[derive(Clone, Debug)]
pub struct ModelBuilder {
    ground_name: String,
    bodies: Vec<Body>,
    joints: Vec<JointSpec>,
    actuators: Vec<ActuatorSpec>,
    pseudo_states: Vec<PseudoStateSpec>,
    constraints: Vec<ConstraintSpec>,
    contacts: Vec<ContactSpec>,
    defaults: HashMap<String, f64>,
    locked: HashSet<String>,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self {
            ground_name: "ground".to_string(),
            bodies: Vec::new(),
            joints: Vec::new(),
            actuators: Vec::new(),
            pseudo_states: Vec::new(),
            constraints: Vec::new(),
            contacts: Vec::new(),
            defaults: HashMap::new(),
            locked: HashSet::new(),
        }
    }

    pub fn ground_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.ground_name = name.into();
        self
    }

    pub fn add_body(&mut self, name: impl Into<String>, mass: f64, inertia: DMat3) -> &mut Self {
        self.bodies.push(Body::new(name, mass, inertia));
        self
    }

    pub fn add_joint(&mut self, joint: JointSpec) -> &mut Self {
        self.joints.push(joint);
        self
    }

    pub fn add_actuator(&mut self, actuator: ActuatorSpec) -> &mut Self {
        self.actuators.push(actuator);
        self
    }

    pub fn add_pseudo_state(&mut self, name: impl Into<String>, default_value: f64, rate: RateSpec) -> &mut Self {
        self.pseudo_states.push(PseudoStateSpec {
            name: name.into(),
            default_value,
            rate,
        });
        self
    }

    pub fn add_constraint(&mut self, constraint: ConstraintSpec) -> &mut Self {
        self.constraints.push(constraint);
        self
    }

    pub fn add_contact(&mut self, contact: ContactSpec) -> &mut Self {
        self.contacts.push(contact);
        self
    }

    pub fn coordinate_default(&mut self, coordinate: impl Into<String>, value: f64) -> &mut Self {
        self.defaults.insert(coordinate.into(), value);
        self
    }

    pub fn lock_coordinate(&mut self, coordinate: impl Into<String>) -> &mut Self {
        self.locked.insert(coordinate.into());
        self
    }

    /// 校验并冻结拓扑
    pub fn build(&self) -> Result<Topology> {
        let mut registry = NameRegistry::default();

        // 第一步：刚体（地面固定为 0）
        let mut bodies = Vec::with_capacity(self.bodies.len() + 1);
        bodies.push(Body::ground(self.ground_name.clone()));
        bodies.extend(self.bodies.iter().cloned());
        for (i, body) in bodies.iter_mut().enumerate() {
            body.index = i;
            if i > 0 && !(body.mass >= 0.0 && body.mass.is_finite()) {
                return Err(EngineError::invalid_topology(format!(
                    "body '{}' has invalid mass {}",
                    body.name, body.mass
                )));
            }
        }
        registry
            .register(Category::Body, bodies.iter().map(|b| b.name.clone()).collect())
            .map_err(|n| EngineError::invalid_topology(format!("duplicate body name '{n}'")))?;

        // 第二步：关节与坐标
        let mut joints = Vec::with_capacity(self.joints.len());
        let mut coordinates = Vec::new();
        for (j, spec) in self.joints.iter().enumerate() {
            let resolve = |name: &str| {
                registry.index_of(Category::Body, name).ok_or_else(|| {
                    EngineError::invalid_topology(format!("joint '{}' references unknown body '{}'", spec.name, name))
                })
            };
            let parent = resolve(&spec.parent)?;
            let child = resolve(&spec.child)?;
            if child == 0 {
                return Err(EngineError::invalid_topology(format!(
                    "joint '{}' uses the ground as its child",
                    spec.name
                )));
            }
            if parent == child {
                return Err(EngineError::invalid_topology(format!("joint '{}' connects a body to itself", spec.name)));
            }
            if let Some(existing) = bodies[child].inboard_joint {
                return Err(EngineError::invalid_topology(format!(
                    "body '{}' already has inboard joint '{}'",
                    spec.child, self.joints[existing].name
                )));
            }

            let primitives = spec.kind.primitives();
            if primitives.len() != spec.coordinates.len() {
                return Err(EngineError::invalid_topology(format!(
                    "joint '{}' has {} degrees of freedom but {} coordinate names",
                    spec.name,
                    primitives.len(),
                    spec.coordinates.len()
                )));
            }

            let mut dofs = Vec::with_capacity(primitives.len());
            for ((motion, axis), coord_name) in primitives.into_iter().zip(&spec.coordinates) {
                let axis = axis.try_normalize().ok_or_else(|| {
                    EngineError::invalid_topology(format!("joint '{}' has a zero-length axis", spec.name))
                })?;
                let index = coordinates.len();
                let mut flags = CoordinateFlags::empty();
                if motion == MotionType::Rotational {
                    flags |= CoordinateFlags::ROTATIONAL;
                }
                if self.locked.contains(coord_name) {
                    flags |= CoordinateFlags::LOCKED;
                }
                coordinates.push(Coordinate {
                    name: coord_name.clone(),
                    index,
                    joint: j,
                    default_value: self.defaults.get(coord_name).copied().unwrap_or(0.0),
                    flags,
                });
                dofs.push(Dof {
                    motion,
                    axis,
                    coordinate: index,
                });
            }

            bodies[child].inboard_joint = Some(j);
            bodies[child].body_to_joint = spec.body_to_joint;
            joints.push(Joint {
                name: spec.name.clone(),
                parent,
                child,
                kind: spec.kind,
                inboard_to_joint: spec.inboard_to_joint,
                dofs,
            });
        }
        registry
            .register(Category::Joint, joints.iter().map(|j| j.name.clone()).collect())
            .map_err(|n| EngineError::invalid_topology(format!("duplicate joint name '{n}'")))?;

        let coord_names: Vec<String> = coordinates.iter().map(|c| c.name.clone()).collect();
        let speed_names: Vec<String> = coordinates.iter().map(Coordinate::speed_name).collect();
        registry
            .register(Category::Coordinate, coord_names.clone())
            .map_err(|n| EngineError::invalid_topology(format!("duplicate coordinate name '{n}'")))?;
        registry
            .register(Category::Speed, speed_names.clone())
            .map_err(|n| EngineError::invalid_topology(format!("duplicate speed name '{n}'")))?;
        registry
            .register(Category::State, coord_names.into_iter().chain(speed_names).collect())
            .map_err(|n| EngineError::invalid_topology(format!("state name '{n}' is ambiguous")))?;

        for name in self.defaults.keys().chain(self.locked.iter()) {
            if registry.index_of(Category::Coordinate, name).is_none() {
                return Err(EngineError::invalid_topology(format!("unknown coordinate '{name}'")));
            }
        }

        // 第三步：每个非地面刚体恰有一个内侧关节，且均可从地面到达
        if let Some(orphan) = bodies.iter().skip(1).find(|b| b.inboard_joint.is_none()) {
            return Err(EngineError::invalid_topology(format!("body '{}' has no inboard joint", orphan.name)));
        }
        let order = traversal_order(&bodies, &joints)?;

        let mut body_coordinates = vec![Vec::new(); bodies.len()];
        for &j in &order {
            let joint = &joints[j];
            let mut coords = body_coordinates[joint.parent].clone();
            coords.extend(joint.coordinates());
            coords.sort_unstable();
            body_coordinates[joint.child] = coords;
        }

        // 第四步：执行器（每个执行器一个控制量）
        let mut actuators = Vec::with_capacity(self.actuators.len());
        for (control, spec) in self.actuators.iter().enumerate() {
            let coordinate = registry.index_of(Category::Coordinate, &spec.coordinate).ok_or_else(|| {
                EngineError::invalid_topology(format!(
                    "actuator '{}' references unknown coordinate '{}'",
                    spec.name, spec.coordinate
                ))
            })?;
            if spec.min_control > spec.max_control {
                return Err(EngineError::invalid_topology(format!(
                    "actuator '{}' has an empty control range",
                    spec.name
                )));
            }
            actuators.push(CoordinateActuator::new(
                spec.name.clone(),
                coordinate,
                control,
                spec.optimal_force,
                spec.min_control,
                spec.max_control,
            ));
        }
        registry
            .register(Category::Control, actuators.iter().map(|a| a.name.clone()).collect())
            .map_err(|n| EngineError::invalid_topology(format!("duplicate control name '{n}'")))?;

        // 第五步：伪状态
        let mut pseudo_states = Vec::with_capacity(self.pseudo_states.len());
        for (index, spec) in self.pseudo_states.iter().enumerate() {
            let control = |name: &str| {
                registry.index_of(Category::Control, name).ok_or_else(|| {
                    EngineError::invalid_topology(format!(
                        "pseudo-state '{}' references unknown control '{}'",
                        spec.name, name
                    ))
                })
            };
            let model = match &spec.rate {
                RateSpec::Activation {
                    control: c,
                    activation_time,
                    deactivation_time,
                } => {
                    if !(*activation_time > 0.0 && *deactivation_time > 0.0) {
                        return Err(EngineError::invalid_topology(format!(
                            "pseudo-state '{}' needs positive time constants",
                            spec.name
                        )));
                    }
                    PseudoStateModel::Activation {
                        control: control(c)?,
                        activation_time: *activation_time,
                        deactivation_time: *deactivation_time,
                    }
                }
                RateSpec::ControlIntegrator { control: c } => PseudoStateModel::ControlIntegrator { control: control(c)? },
                RateSpec::Constant => PseudoStateModel::Constant,
            };
            pseudo_states.push(PseudoState {
                name: spec.name.clone(),
                index,
                default_value: spec.default_value,
                model,
            });
        }
        registry
            .register(Category::PseudoState, pseudo_states.iter().map(|p| p.name.clone()).collect())
            .map_err(|n| EngineError::invalid_topology(format!("duplicate pseudo-state name '{n}'")))?;

        // 第六步：约束与接触
        let body_index = |name: &str| {
            registry
                .index_of(Category::Body, name)
                .ok_or_else(|| EngineError::invalid_topology(format!("unknown body '{name}'")))
        };
        let coord_index = |name: &str| {
            registry
                .index_of(Category::Coordinate, name)
                .ok_or_else(|| EngineError::invalid_topology(format!("unknown coordinate '{name}'")))
        };

        let mut constraints = Vec::with_capacity(self.constraints.len());
        for spec in &self.constraints {
            let constraint = match spec {
                ConstraintSpec::CoordinateCoupler {
                    dependent,
                    independent,
                    scale,
                    offset,
                } => {
                    let dependent = coord_index(dependent)?;
                    let independent = coord_index(independent)?;
                    if dependent == independent {
                        return Err(EngineError::invalid_topology("coordinate coupler couples a coordinate to itself"));
                    }
                    Constraint::CoordinateCoupler {
                        dependent,
                        independent,
                        scale: *scale,
                        offset: *offset,
                    }
                }
                ConstraintSpec::PointOnPoint {
                    body_a,
                    point_a,
                    body_b,
                    point_b,
                } => Constraint::PointOnPoint {
                    body_a: body_index(body_a)?,
                    point_a: *point_a,
                    body_b: body_index(body_b)?,
                    point_b: *point_b,
                },
            };
            constraints.push(constraint);
        }

        let mut contacts = Vec::with_capacity(self.contacts.len());
        for (id, spec) in self.contacts.iter().enumerate() {
            let body_a = body_index(&spec.body_a)?;
            let body_b = body_index(&spec.body_b)?;
            if body_a == body_b {
                return Err(EngineError::invalid_topology(format!("contact {id} pairs body '{}' with itself", spec.body_a)));
            }
            let normal = spec
                .normal
                .try_normalize()
                .ok_or_else(|| EngineError::invalid_topology(format!("contact {id} has a zero-length normal")))?;
            contacts.push(ContactPoint {
                id,
                body_a,
                body_b,
                point_a: spec.point_a,
                point_b: spec.point_b,
                normal,
                material: spec.material,
            });
        }

        Ok(Topology {
            bodies,
            joints,
            coordinates,
            actuators,
            pseudo_states,
            constraints,
            contacts,
            order,
            body_coordinates,
            registry,
        })
    }
}

/// 从地面开始广度优先遍历，得到父先于子的关节顺序
fn traversal_order(bodies: &[Body], joints: &[Joint]) -> Result<Vec<usize>> {
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); bodies.len()];
    for (j, joint) in joints.iter().enumerate() {
        children[joint.parent].push(j);
    }

    let mut order = Vec::with_capacity(joints.len());
    let mut queue = VecDeque::from([0usize]);
    while let Some(body) = queue.pop_front() {
        for &j in &children[body] {
            order.push(j);
            queue.push_back(joints[j].child);
        }
    }

    if order.len() != joints.len() {
        let reached: HashSet<usize> = order.iter().map(|&j| joints[j].child).collect();
        let stray = bodies
            .iter()
            .skip(1)
            .find(|b| !reached.contains(&b.index))
            .map_or("?", |b| b.name.as_str());
        return Err(EngineError::invalid_topology(format!(
            "body '{stray}' is not connected to the ground (kinematic loop)"
        )));
    }
    Ok(order)
}
