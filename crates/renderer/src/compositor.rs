//! Per-frame draw planning.
//!
//! The compositor never touches the GPU. It turns the current scene into a
//! [`FramePlan`]: a clear colour plus an ordered list of [`DrawCommand`]s that
//! the GPU state executes. Each zone content variant has its own planning
//! function, and each one falls back to a flat quad when its texture or
//! program is missing.

use glam::{Mat4, Vec2, Vec3};
use tracing::trace;

use crate::shader::{ProgramKind, ProgramTable, Symbol};
use crate::texture::{DrawPlan, SizedTexture, TextureHandle};
use crate::types::{
    CrossfadeCurve, Rgba, Zone, ZoneContent, ZoneId, DEFAULT_CLEAR, WORLD_HALF_HEIGHT,
    WORLD_HALF_WIDTH,
};

/// Height of the FPS overlay quad in world units.
const OVERLAY_HEIGHT: f32 = 0.5;
/// Gap between the overlay and the top-left corner of the world.
const OVERLAY_MARGIN: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec4(Rgba),
    Mat4(Mat4),
}

/// What a draw command renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawTarget {
    Zone(ZoneId),
    Overlay,
}

/// One quad draw with everything needed to bind it.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub target: DrawTarget,
    pub program: ProgramKind,
    pub uniforms: Vec<(Symbol, UniformValue)>,
    pub textures: Vec<(Symbol, TextureHandle)>,
}

impl DrawCommand {
    pub fn uniform(&self, symbol: Symbol) -> Option<UniformValue> {
        self.uniforms
            .iter()
            .find(|(candidate, _)| *candidate == symbol)
            .map(|(_, value)| *value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub clear: Rgba,
    /// Surface size in physical pixels the draws are mapped onto.
    pub viewport: (u32, u32),
    pub draws: Vec<DrawCommand>,
}

/// Ticker inputs for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickerView {
    pub texture: Option<TextureHandle>,
    pub offset: f32,
    pub smoothing: f32,
    pub repeat: f32,
}

/// Scene snapshot the compositor plans from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub pic: DrawPlan,
    pub video: Option<TextureHandle>,
    pub ticker: TickerView,
    pub overlay: Option<SizedTexture>,
}

#[derive(Debug, Clone)]
pub struct ZoneCompositor {
    projection: Mat4,
    zones: [Zone; 3],
    clear: Rgba,
    curve: CrossfadeCurve,
    viewport: (u32, u32),
}

impl Default for ZoneCompositor {
    fn default() -> Self {
        Self::new(DEFAULT_CLEAR, CrossfadeCurve::default())
    }
}

impl ZoneCompositor {
    pub fn new(clear: Rgba, curve: CrossfadeCurve) -> Self {
        Self {
            projection: Mat4::orthographic_rh(
                -WORLD_HALF_WIDTH,
                WORLD_HALF_WIDTH,
                -WORLD_HALF_HEIGHT,
                WORLD_HALF_HEIGHT,
                -1.0,
                1.0,
            ),
            zones: Zone::LAYOUT,
            clear,
            curve,
            viewport: (1, 1),
        }
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn zones(&self) -> &[Zone; 3] {
        &self.zones
    }

    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.id == id)
    }

    /// Records the new surface size. The world projection is fixed, so zone
    /// content keeps its layout and only the viewport changes.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1), height.max(1));
        trace!(width, height, "compositor viewport updated");
    }

    /// Model-view-projection for a quad centred at `center` with extent `scale`.
    pub fn mvp(&self, center: Vec2, scale: Vec2) -> Mat4 {
        let model = Mat4::from_translation(Vec3::new(center.x, center.y, 0.0))
            * Mat4::from_scale(Vec3::new(scale.x, scale.y, 1.0));
        self.projection * model
    }

    pub fn compose(&self, inputs: &FrameInputs, programs: &ProgramTable) -> FramePlan {
        let mut draws = Vec::with_capacity(6);
        for zone in &self.zones {
            match zone.content {
                ZoneContent::Image => self.plan_image(zone, inputs.pic, programs, &mut draws),
                ZoneContent::Video => self.plan_video(zone, inputs.video, programs, &mut draws),
                ZoneContent::Ticker => self.plan_ticker(zone, &inputs.ticker, programs, &mut draws),
            }
        }
        if let Some(overlay) = inputs.overlay {
            self.plan_overlay(overlay, programs, &mut draws);
        }
        FramePlan {
            clear: self.clear,
            viewport: self.viewport,
            draws,
        }
    }

    fn plan_image(
        &self,
        zone: &Zone,
        plan: DrawPlan,
        programs: &ProgramTable,
        draws: &mut Vec<DrawCommand>,
    ) {
        let mvp = self.mvp(zone.center, zone.scale);
        let target = DrawTarget::Zone(zone.id);
        match plan {
            DrawPlan::Blend { from, to, progress } if programs.contains(ProgramKind::Crossfade) => {
                draws.push(DrawCommand {
                    target,
                    program: ProgramKind::Crossfade,
                    uniforms: vec![
                        (Symbol::MvpMatrix, UniformValue::Mat4(mvp)),
                        (
                            Symbol::Progress,
                            UniformValue::Float(self.curve.sample(progress)),
                        ),
                    ],
                    textures: vec![(Symbol::Texture, from), (Symbol::SecondTexture, to)],
                });
            }
            // Without the crossfade program, show whichever image dominates.
            DrawPlan::Blend { from, to, progress } => {
                let shown = if progress < 0.5 { from } else { to };
                self.textured(target, ProgramKind::Texture, mvp, shown, zone, programs, draws);
            }
            DrawPlan::Single(texture) => {
                self.textured(target, ProgramKind::Texture, mvp, texture, zone, programs, draws);
            }
            DrawPlan::Empty => self.flat(target, mvp, zone.color, programs, draws),
        }
    }

    fn plan_video(
        &self,
        zone: &Zone,
        video: Option<TextureHandle>,
        programs: &ProgramTable,
        draws: &mut Vec<DrawCommand>,
    ) {
        let mvp = self.mvp(zone.center, zone.scale);
        let target = DrawTarget::Zone(zone.id);
        match video {
            Some(texture) => {
                self.textured(target, ProgramKind::Video, mvp, texture, zone, programs, draws)
            }
            None => self.flat(target, mvp, zone.color, programs, draws),
        }
    }

    fn plan_ticker(
        &self,
        zone: &Zone,
        ticker: &TickerView,
        programs: &ProgramTable,
        draws: &mut Vec<DrawCommand>,
    ) {
        let mvp = self.mvp(zone.center, zone.scale);
        let target = DrawTarget::Zone(zone.id);
        self.flat(target, mvp, zone.color, programs, draws);

        let Some(texture) = ticker.texture else {
            return;
        };
        if !programs.contains(ProgramKind::Ticker) {
            return;
        }
        draws.push(DrawCommand {
            target,
            program: ProgramKind::Ticker,
            uniforms: vec![
                (Symbol::MvpMatrix, UniformValue::Mat4(mvp)),
                (Symbol::ScrollOffset, UniformValue::Float(ticker.offset)),
                (Symbol::SmoothFactor, UniformValue::Float(ticker.smoothing)),
                (Symbol::Repeat, UniformValue::Float(ticker.repeat)),
            ],
            textures: vec![(Symbol::Texture, texture)],
        });
    }

    fn plan_overlay(
        &self,
        overlay: SizedTexture,
        programs: &ProgramTable,
        draws: &mut Vec<DrawCommand>,
    ) {
        if !programs.contains(ProgramKind::Texture) {
            return;
        }
        let scale = Vec2::new(OVERLAY_HEIGHT * overlay.aspect(), OVERLAY_HEIGHT);
        let center = Vec2::new(
            -WORLD_HALF_WIDTH + OVERLAY_MARGIN + scale.x / 2.0,
            WORLD_HALF_HEIGHT - OVERLAY_MARGIN - scale.y / 2.0,
        );
        draws.push(DrawCommand {
            target: DrawTarget::Overlay,
            program: ProgramKind::Texture,
            uniforms: vec![(Symbol::MvpMatrix, UniformValue::Mat4(self.mvp(center, scale)))],
            textures: vec![(Symbol::Texture, overlay.handle)],
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn textured(
        &self,
        target: DrawTarget,
        program: ProgramKind,
        mvp: Mat4,
        texture: TextureHandle,
        zone: &Zone,
        programs: &ProgramTable,
        draws: &mut Vec<DrawCommand>,
    ) {
        if !programs.contains(program) {
            self.flat(target, mvp, zone.color, programs, draws);
            return;
        }
        draws.push(DrawCommand {
            target,
            program,
            uniforms: vec![(Symbol::MvpMatrix, UniformValue::Mat4(mvp))],
            textures: vec![(Symbol::Texture, texture)],
        });
    }

    fn flat(
        &self,
        target: DrawTarget,
        mvp: Mat4,
        color: Rgba,
        programs: &ProgramTable,
        draws: &mut Vec<DrawCommand>,
    ) {
        if !programs.contains(ProgramKind::Flat) {
            trace!(?target, "flat program unavailable; zone left at clear colour");
            return;
        }
        draws.push(DrawCommand {
            target,
            program: ProgramKind::Flat,
            uniforms: vec![
                (Symbol::MvpMatrix, UniformValue::Mat4(mvp)),
                (Symbol::Color, UniformValue::Vec4(color)),
            ],
            textures: Vec::new(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PIC_FALLBACK, TICKER_BACKGROUND, VIDEO_FALLBACK};
    use glam::Vec4;

    fn handle(raw: u32) -> TextureHandle {
        TextureHandle::from_raw(raw).unwrap()
    }

    fn inputs(pic: DrawPlan) -> FrameInputs {
        FrameInputs {
            pic,
            video: None,
            ticker: TickerView {
                texture: None,
                offset: 0.0,
                smoothing: 0.3,
                repeat: 1.0,
            },
            overlay: None,
        }
    }

    fn for_zone(plan: &FramePlan, id: ZoneId) -> Vec<&DrawCommand> {
        plan.draws
            .iter()
            .filter(|draw| draw.target == DrawTarget::Zone(id))
            .collect()
    }

    #[test]
    fn zone_transforms_land_in_clip_space() {
        let compositor = ZoneCompositor::default();
        let pic = compositor.zone(ZoneId::Pic).unwrap();
        let mvp = compositor.mvp(pic.center, pic.scale);
        let top_left = mvp * Vec4::new(-0.5, 0.5, 0.0, 1.0);
        let bottom_right = mvp * Vec4::new(0.5, -0.5, 0.0, 1.0);
        assert!((top_left.x + 1.0).abs() < 1e-5 && (top_left.y - 1.0).abs() < 1e-5);
        assert!(bottom_right.x.abs() < 1e-5 && (bottom_right.y + 1.0).abs() < 1e-5);

        let ticker = compositor.zone(ZoneId::Ticker).unwrap();
        let mvp = compositor.mvp(ticker.center, ticker.scale);
        let top = mvp * Vec4::new(0.5, 0.5, 0.0, 1.0);
        assert!((top.x - 1.0).abs() < 1e-5);
        assert!((top.y - (-3.5 / 4.5)).abs() < 1e-5);
    }

    #[test]
    fn plan_carries_the_resized_viewport() {
        let programs = ProgramTable::reflect_builtin();
        let mut compositor = ZoneCompositor::default();
        compositor.resize(1920, 1080);
        assert_eq!(compositor.compose(&inputs(DrawPlan::Empty), &programs).viewport, (1920, 1080));

        compositor.resize(0, 600);
        assert_eq!(compositor.compose(&inputs(DrawPlan::Empty), &programs).viewport, (1, 600));
    }

    #[test]
    fn every_zone_falls_back_to_flat_colour() {
        let compositor = ZoneCompositor::default();
        let plan = compositor.compose(&inputs(DrawPlan::Empty), &ProgramTable::reflect_builtin());

        assert_eq!(plan.clear, DEFAULT_CLEAR);
        assert_eq!(plan.draws.len(), 3);
        let colours: Vec<_> = plan
            .draws
            .iter()
            .map(|draw| {
                assert_eq!(draw.program, ProgramKind::Flat);
                draw.uniform(Symbol::Color)
            })
            .collect();
        assert_eq!(
            colours,
            vec![
                Some(UniformValue::Vec4(PIC_FALLBACK)),
                Some(UniformValue::Vec4(VIDEO_FALLBACK)),
                Some(UniformValue::Vec4(TICKER_BACKGROUND)),
            ]
        );
    }

    #[test]
    fn blend_uses_crossfade_with_eased_progress() {
        let compositor = ZoneCompositor::new(DEFAULT_CLEAR, CrossfadeCurve::Smoothstep);
        let plan = compositor.compose(
            &inputs(DrawPlan::Blend {
                from: handle(1),
                to: handle(2),
                progress: 0.25,
            }),
            &ProgramTable::reflect_builtin(),
        );
        let pic = for_zone(&plan, ZoneId::Pic);
        assert_eq!(pic.len(), 1);
        assert_eq!(pic[0].program, ProgramKind::Crossfade);
        assert_eq!(
            pic[0].textures,
            vec![(Symbol::Texture, handle(1)), (Symbol::SecondTexture, handle(2))]
        );
        assert_eq!(
            pic[0].uniform(Symbol::Progress),
            Some(UniformValue::Float(0.15625))
        );
    }

    #[test]
    fn missing_programs_degrade_to_fallbacks() {
        let mut programs = ProgramTable::reflect_builtin();
        programs.remove(ProgramKind::Crossfade);
        programs.remove(ProgramKind::Video);
        let compositor = ZoneCompositor::default();
        let mut frame = inputs(DrawPlan::Blend {
            from: handle(1),
            to: handle(2),
            progress: 0.75,
        });
        frame.video = Some(handle(3));

        let plan = compositor.compose(&frame, &programs);
        let pic = for_zone(&plan, ZoneId::Pic);
        assert_eq!(pic[0].program, ProgramKind::Texture);
        assert_eq!(pic[0].textures, vec![(Symbol::Texture, handle(2))]);
        let video = for_zone(&plan, ZoneId::Video);
        assert_eq!(video[0].program, ProgramKind::Flat);
    }

    #[test]
    fn ticker_draws_background_then_scrolling_text_after_opaque_zones() {
        let compositor = ZoneCompositor::default();
        let mut frame = inputs(DrawPlan::Single(handle(1)));
        frame.video = Some(handle(2));
        frame.ticker = TickerView {
            texture: Some(handle(3)),
            offset: 0.42,
            smoothing: 0.3,
            repeat: 2.0,
        };
        frame.overlay = Some(SizedTexture {
            handle: handle(4),
            width: 200,
            height: 50,
        });

        let plan = compositor.compose(&frame, &ProgramTable::reflect_builtin());
        let programs: Vec<_> = plan.draws.iter().map(|draw| draw.program).collect();
        assert_eq!(
            programs,
            vec![
                ProgramKind::Texture,
                ProgramKind::Video,
                ProgramKind::Flat,
                ProgramKind::Ticker,
                ProgramKind::Texture,
            ]
        );
        let ticker = &plan.draws[3];
        assert_eq!(ticker.uniform(Symbol::ScrollOffset), Some(UniformValue::Float(0.42)));
        assert_eq!(ticker.uniform(Symbol::SmoothFactor), Some(UniformValue::Float(0.3)));
        assert_eq!(ticker.uniform(Symbol::Repeat), Some(UniformValue::Float(2.0)));
        assert_eq!(plan.draws[4].target, DrawTarget::Overlay);
    }

    #[test]
    fn overlay_sits_in_the_top_left_corner() {
        let compositor = ZoneCompositor::default();
        let mut frame = inputs(DrawPlan::Empty);
        frame.overlay = Some(SizedTexture {
            handle: handle(9),
            width: 400,
            height: 100,
        });
        let plan = compositor.compose(&frame, &ProgramTable::reflect_builtin());
        let overlay = plan.draws.last().unwrap();
        let Some(UniformValue::Mat4(mvp)) = overlay.uniform(Symbol::MvpMatrix) else {
            panic!("overlay without mvp");
        };
        let corner = mvp * Vec4::new(-0.5, 0.5, 0.0, 1.0);
        let expected_x = (-WORLD_HALF_WIDTH + OVERLAY_MARGIN) / WORLD_HALF_WIDTH;
        let expected_y = (WORLD_HALF_HEIGHT - OVERLAY_MARGIN) / WORLD_HALF_HEIGHT;
        assert!((corner.x - expected_x).abs() < 1e-5);
        assert!((corner.y - expected_y).abs() < 1e-5);
    }
}
