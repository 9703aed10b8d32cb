//! 姿态表示转换
//!
//! Euler 角一律为体固连 X-Y-Z：R = Rx(a) · Ry(b) · Rz(c)。
//! 四元数标量部非负。方向余弦矩阵的列顺序为行优先 R00, R01, ..., R22。
//!
//! 单样本转换为纯函数；`Storage` 版本按列组就地替换。

use glam::{DMat3, DQuat, DVec3};

use crate::engine::DynamicsEngine;
use crate::error::Result;
use crate::storage::Storage;

// ============================================================================
// 单样本
// ============================================================================

/// 四元数规范化：单位长度，标量部非负
#[inline]
pub fn canonical_quaternion(q: DQuat) -> DQuat {
    let q = q.normalize();
    if q.w < 0.0 {
        -q
    } else {
        q
    }
}

pub fn euler_to_direction_cosines(euler: DVec3) -> DMat3 {
    DMat3::from_rotation_x(euler.x) * DMat3::from_rotation_y(euler.y) * DMat3::from_rotation_z(euler.z)
}

/// 方向余弦 → Euler 角
///
/// 第一角取自第三列，第三角由 Rx(−a)·R 的第二行求出，
/// 因此接近万向节锁时重建矩阵仍然精确。
/// 只有 cos b 精确为零（或次正规）时才视为万向节锁：第三角取 0，第一角吸收合成旋转。
pub fn direction_cosines_to_euler(m: DMat3) -> DVec3 {
    // glam 列优先：m.col(j)[i] = R[i][j]
    let (r02, r12, r22) = (m.z_axis.x, m.z_axis.y, m.z_axis.z);
    let cos_b = r12.hypot(r22);
    let b = r02.atan2(cos_b);
    if cos_b < f64::MIN_POSITIVE {
        let a = m.y_axis.z.atan2(m.y_axis.y);
        return DVec3::new(a, b, 0.0);
    }
    let a = (-r12).atan2(r22);
    let (sa, ca) = a.sin_cos();
    // Rx(−a)·R = Ry(b)·Rz(c)，其第二行为 (sin c, cos c, 0)
    let sin_c = ca * m.x_axis.y + sa * m.x_axis.z;
    let cos_c = ca * m.y_axis.y + sa * m.y_axis.z;
    DVec3::new(a, b, sin_c.atan2(cos_c))
}

pub fn direction_cosines_to_quaternion(m: DMat3) -> DQuat {
    canonical_quaternion(DQuat::from_mat3(&m))
}

pub fn quaternion_to_direction_cosines(q: DQuat) -> DMat3 {
    DMat3::from_quat(q.normalize())
}

pub fn quaternion_to_euler(q: DQuat) -> DVec3 {
    direction_cosines_to_euler(quaternion_to_direction_cosines(q))
}

pub fn euler_to_quaternion(euler: DVec3) -> DQuat {
    canonical_quaternion(
        DQuat::from_rotation_x(euler.x) * DQuat::from_rotation_y(euler.y) * DQuat::from_rotation_z(euler.z),
    )
}

#[inline]
pub fn radians_to_degrees(value: f64) -> f64 {
    value.to_degrees()
}

#[inline]
pub fn degrees_to_radians(value: f64) -> f64 {
    value.to_radians()
}

// ============================================================================
// 缓冲区版本
// ============================================================================

fn quat_from(g: &[f64]) -> DQuat {
    DQuat::from_xyzw(g[1], g[2], g[3], g[0])
}

fn quat_values(q: DQuat) -> Vec<f64> {
    vec![q.w, q.x, q.y, q.z]
}

fn dc_from(g: &[f64]) -> DMat3 {
    // 行优先输入
    DMat3::from_cols_array(&[g[0], g[3], g[6], g[1], g[4], g[7], g[2], g[5], g[8]])
}

fn dc_values(m: DMat3) -> Vec<f64> {
    let c = m.to_cols_array();
    vec![c[0], c[3], c[6], c[1], c[4], c[7], c[2], c[5], c[8]]
}

/// 列组 (w, x, y, z) → (a, b, c)
pub fn storage_quaternion_to_euler(storage: &mut Storage, quaternion: [&str; 4], euler: [&str; 3]) -> Result<()> {
    storage.transform_column_group(&quaternion, &euler, |g| quaternion_to_euler(quat_from(g)).to_array().to_vec())
}

pub fn storage_euler_to_quaternion(storage: &mut Storage, euler: [&str; 3], quaternion: [&str; 4]) -> Result<()> {
    storage.transform_column_group(&euler, &quaternion, |g| {
        quat_values(euler_to_quaternion(DVec3::new(g[0], g[1], g[2])))
    })
}

pub fn storage_euler_to_direction_cosines(storage: &mut Storage, euler: [&str; 3], cosines: [&str; 9]) -> Result<()> {
    storage.transform_column_group(&euler, &cosines, |g| {
        dc_values(euler_to_direction_cosines(DVec3::new(g[0], g[1], g[2])))
    })
}

pub fn storage_direction_cosines_to_euler(storage: &mut Storage, cosines: [&str; 9], euler: [&str; 3]) -> Result<()> {
    storage.transform_column_group(&cosines, &euler, |g| direction_cosines_to_euler(dc_from(g)).to_array().to_vec())
}

pub fn storage_quaternion_to_direction_cosines(
    storage: &mut Storage,
    quaternion: [&str; 4],
    cosines: [&str; 9],
) -> Result<()> {
    storage.transform_column_group(&quaternion, &cosines, |g| {
        dc_values(quaternion_to_direction_cosines(quat_from(g)))
    })
}

pub fn storage_direction_cosines_to_quaternion(
    storage: &mut Storage,
    cosines: [&str; 9],
    quaternion: [&str; 4],
) -> Result<()> {
    storage.transform_column_group(&cosines, &quaternion, |g| {
        quat_values(direction_cosines_to_quaternion(dc_from(g)))
    })
}

pub fn storage_radians_to_degrees(storage: &mut Storage, columns: &[&str]) -> Result<()> {
    storage.map_columns(columns, radians_to_degrees)
}

pub fn storage_degrees_to_radians(storage: &mut Storage, columns: &[&str]) -> Result<()> {
    storage.map_columns(columns, degrees_to_radians)
}

// ============================================================================
// 引擎：按旋转坐标名转换
// ============================================================================

impl DynamicsEngine {
    /// 缓冲区中以旋转坐标（及其速度）命名的列
    fn rotational_columns(&self, storage: &Storage) -> Vec<String> {
        let mut names = Vec::new();
        for coordinate in self.topology.coordinates.iter().filter(|c| c.is_rotational()) {
            names.push(coordinate.name.clone());
            names.push(coordinate.speed_name());
        }
        names.retain(|name| storage.column_index(name).is_some());
        names
    }

    /// 旋转坐标列：弧度 → 角度；平移坐标列保持不变
    pub fn convert_radians_to_degrees(&self, storage: &mut Storage) -> Result<()> {
        let columns = self.rotational_columns(storage);
        let refs: Vec<&str> = columns.iter().map(String::as_str).collect();
        storage_radians_to_degrees(storage, &refs)
    }

    pub fn convert_degrees_to_radians(&self, storage: &mut Storage) -> Result<()> {
        let columns = self.rotational_columns(storage);
        let refs: Vec<&str> = columns.iter().map(String::as_str).collect();
        storage_degrees_to_radians(storage, &refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    /// 确定性的伪随机姿态（黄金比例序列）
    fn orientations(count: usize) -> impl Iterator<Item = DQuat> {
        const PHI: [f64; 4] = [0.618_033_988_749_895, 0.754_877_666_246_693, 0.569_840_290_998_053, 0.819_172_513_396_164];
        (0..count).map(|i| {
            let t = i as f64 + 0.5;
            let v: Vec<f64> = PHI.iter().map(|p| (t * p).fract() * 2.0 - 1.0).collect();
            DQuat::from_xyzw(v[0], v[1], v[2], v[3] + 1.0e-3)
        })
    }

    fn same_rotation(a: DQuat, b: DQuat) -> bool {
        // q 与 −q 表示同一旋转
        a.abs_diff_eq(b, 1e-9) || a.abs_diff_eq(-b, 1e-9)
    }

    #[test]
    fn test_quaternion_direction_cosine_round_trip() {
        for q in orientations(10_000) {
            let q = canonical_quaternion(q);
            let back = direction_cosines_to_quaternion(quaternion_to_direction_cosines(q));
            assert!(back.w >= 0.0);
            assert!(same_rotation(q, back), "{q:?} -> {back:?}");
        }
    }

    #[test]
    fn test_euler_round_trip() {
        for q in orientations(10_000) {
            let m = quaternion_to_direction_cosines(q);
            let euler = direction_cosines_to_euler(m);
            let rebuilt = euler_to_direction_cosines(euler);
            assert!(m.abs_diff_eq(rebuilt, 1e-9), "{euler:?}");
            assert!(same_rotation(canonical_quaternion(q), euler_to_quaternion(euler)));
        }
    }

    /// b = ±90° 时精确奇异的方向余弦矩阵，s 为合成角
    fn gimbal_matrix(s: f64, sign: f64) -> DMat3 {
        let (ss, cs) = s.sin_cos();
        DMat3::from_cols(
            DVec3::new(0.0, ss, -sign * cs),
            DVec3::new(0.0, cs, sign * ss),
            DVec3::new(sign, 0.0, 0.0),
        )
    }

    #[test]
    fn test_gimbal_lock_convention() {
        let m = gimbal_matrix(0.7, 1.0);
        let euler = direction_cosines_to_euler(m);
        assert_eq!(euler.z, 0.0);
        assert_eq!(euler.y, FRAC_PI_2);
        // 第一角吸收 a + c
        assert!((euler.x - 0.7).abs() < 1e-12);
        assert!(euler_to_direction_cosines(euler).abs_diff_eq(m, 1e-12));

        let m = gimbal_matrix(-0.2, -1.0);
        let euler = direction_cosines_to_euler(m);
        assert_eq!(euler.z, 0.0);
        assert_eq!(euler.y, -FRAC_PI_2);
        assert!(euler_to_direction_cosines(euler).abs_diff_eq(m, 1e-12));
    }

    #[test]
    fn test_near_gimbal_round_trip() {
        for k in 1..=15 {
            let offset = 10f64.powi(-k);
            for b in [FRAC_PI_2 - offset, -(FRAC_PI_2 - offset)] {
                let m = euler_to_direction_cosines(DVec3::new(0.3, b, 0.4));
                let euler = direction_cosines_to_euler(m);
                let rebuilt = euler_to_direction_cosines(euler);
                assert!(m.abs_diff_eq(rebuilt, 1e-9), "k = {k}: {euler:?}");
                assert!((euler.y - b).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_quaternion_scalar_non_negative() {
        let q = euler_to_quaternion(DVec3::new(PI, 0.0, 0.2));
        assert!(q.w >= 0.0);
        let q = direction_cosines_to_quaternion(DMat3::from_rotation_z(1.9 * PI));
        assert!(q.w >= 0.0);
    }

    #[test]
    fn test_storage_quaternion_to_euler() {
        let mut storage = Storage::new(["time_tag", "qw", "qx", "qy", "qz", "knee"]);
        let q = euler_to_quaternion(DVec3::new(0.1, -0.2, 0.3));
        storage.append(0.0, vec![7.0, q.w, q.x, q.y, q.z, 1.0]).unwrap();
        storage_quaternion_to_euler(&mut storage, ["qw", "qx", "qy", "qz"], ["ax", "ay", "az"]).unwrap();

        assert_eq!(storage.labels(), &["time_tag", "ax", "ay", "az", "knee"]);
        let row = &storage.rows()[0].values;
        assert!((row[1] - 0.1).abs() < 1e-12);
        assert!((row[2] + 0.2).abs() < 1e-12);
        assert!((row[3] - 0.3).abs() < 1e-12);
        assert_eq!(row[4], 1.0);
    }

    #[test]
    fn test_storage_direction_cosines_layout() {
        let names = ["r00", "r01", "r02", "r10", "r11", "r12", "r20", "r21", "r22"];
        let mut storage = Storage::new(["a", "b", "c"]);
        storage.append(0.0, vec![0.0, 0.0, FRAC_PI_2]).unwrap();
        storage_euler_to_direction_cosines(&mut storage, ["a", "b", "c"], names).unwrap();
        let row = &storage.rows()[0].values;
        // Rz(90°)：R01 = −1, R10 = 1
        assert!((row[1] + 1.0).abs() < 1e-12);
        assert!((row[3] - 1.0).abs() < 1e-12);

        storage_direction_cosines_to_quaternion(&mut storage, names, ["w", "x", "y", "z"]).unwrap();
        let row = &storage.rows()[0].values;
        assert!((row[0] - (PI / 4.0).cos()).abs() < 1e-12);
        assert!((row[3] - (PI / 4.0).sin()).abs() < 1e-12);
    }

    #[test]
    fn test_storage_unknown_column() {
        let mut storage = Storage::new(["a"]);
        let err = storage_radians_to_degrees(&mut storage, &["b"]).unwrap_err();
        assert_eq!(err.code(), 8);
    }
}
