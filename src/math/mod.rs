use crate::runtime::{Fov, Pose};
use glam::{Mat4, Vec3, Vec4};

/// Near clip distance used for every projection this crate builds.
pub const NEAR_CLIP: f32 = 0.1;
/// Far clip distance paired with [`NEAR_CLIP`].
pub const FAR_CLIP: f32 = 100.0;

/// Empirical scale bridging the embedding renderer's fixed-function
/// projection convention into the runtime's asymmetric one. Matched against
/// the legacy pipeline; do not re-derive.
pub const LEGACY_FRUSTUM_SCALE: f32 = 1.0 / 6000.0;

/// Off-axis perspective projection from four FOV half-angles.
///
/// The left/right/top/bottom tangents need not be symmetric, which is what
/// headset lenses with off-axis optical centers report. Depth is reversed:
/// a point on the near plane lands at clip +1 and a point on the far plane
/// at clip -1, matching a zero-to-one clip control with depth cleared to 0.
pub fn asymmetric_projection(fov: Fov, near: f32, far: f32) -> Mat4 {
    let tl = fov.angle_left.tan();
    let tr = fov.angle_right.tan();
    let tt = fov.angle_up.tan();
    let tb = fov.angle_down.tan();

    let tan_width = tr - tl;
    let tan_height = tt - tb;

    let fx = 2.0 / tan_width;
    let fy = 2.0 / tan_height;
    let x0 = (tr + tl) / tan_width;
    let y0 = (tt + tb) / tan_height;

    let a = (near + far) / (far - near);
    let b = 2.0 * near * far / (far - near);

    Mat4::from_cols(
        Vec4::new(fx, 0.0, 0.0, 0.0),
        Vec4::new(0.0, fy, 0.0, 0.0),
        Vec4::new(x0, y0, a, -1.0),
        Vec4::new(0.0, 0.0, b, 0.0),
    )
}

/// World-from-head transform for a runtime-reported pose: translation
/// composed with the orientation quaternion.
pub fn pose_transform(pose: &Pose) -> Mat4 {
    Mat4::from_translation(pose.position) * Mat4::from_quat(pose.orientation)
}

/// View matrix for a pose, i.e. the inverse of [`pose_transform`].
pub fn view_matrix(pose: &Pose) -> Mat4 {
    pose_transform(pose).inverse()
}

/// Rebases a stored view-projection onto a caller-supplied projection:
/// `stored * scale(LEGACY_FRUSTUM_SCALE) * caller_projection⁻¹`.
pub fn rebase_view_projection(stored: Mat4, caller_projection: Mat4) -> Mat4 {
    let scale = Mat4::from_scale(Vec3::splat(LEGACY_FRUSTUM_SCALE));
    stored * scale * caller_projection.inverse()
}
