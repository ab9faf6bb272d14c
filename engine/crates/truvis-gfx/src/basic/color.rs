/// debug label 使用的颜色
pub struct LabelColor;
impl LabelColor {
    const RED: glam::Vec4 = glam::vec4(1.0, 0.0, 0.0, 1.0);
    const GREEN: glam::Vec4 = glam::vec4(0.0, 1.0, 0.0, 1.0);
    const YELLOW: glam::Vec4 = glam::vec4(1.0, 1.0, 0.0, 1.0);
    const CYAN: glam::Vec4 = glam::vec4(0.0, 1.0, 1.0, 1.0);
    const MAGENTA: glam::Vec4 = glam::vec4(1.0, 0.0, 1.0, 1.0);

    /// 整个 command stream
    pub const COLOR_CMD: glam::Vec4 = Self::GREEN;
    /// 一个 render pass 实例（begin ~ end）
    pub const COLOR_RENDER_PASS: glam::Vec4 = Self::YELLOW;
    /// blit / copy 等传输命令
    pub const COLOR_TRANSFER: glam::Vec4 = Self::CYAN;
    /// compute dispatch
    pub const COLOR_COMPUTE: glam::Vec4 = Self::MAGENTA;
    /// 帧末尾的 overlay pass
    pub const COLOR_OVERLAY: glam::Vec4 = Self::RED;
}
