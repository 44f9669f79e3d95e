//! Interactive forest viewer built with eframe/egui.
//!
//! This module defines [`Viewer`], which owns the planted forest, the
//! software instance renderer and an orbit camera, and implements
//! [`eframe::App`] to draw the forest and let the user fell trees.

use crate::camera::OrbitCamera;
use eframe::App;
use forest_core::{
    config::{ForestConfig, GrammarConfig},
    geometry::branch_endpoints,
    grammar::Rules,
    ground::{FlatGround, Ground},
    population::Population,
    render::CpuInstanceRenderer,
    tree::TreeEntity,
    types::{Category, TreeId},
};
use glam::{Vec2, Vec3};
use rand::{SeedableRng, rngs::StdRng};

/// Longest step fed to the fall animator, so a stalled frame does not
/// snap falling trees straight to the ground.
const MAX_FRAME_DT: f32 = 0.1;

const BARK: egui::Color32 = egui::Color32::from_rgb(0x8b, 0x5a, 0x2b);
const BARK_FELLED: egui::Color32 = egui::Color32::from_rgb(0x5e, 0x4b, 0x3a);
const LEAF: egui::Color32 = egui::Color32::from_rgb(0x2e, 0x8b, 0x57);
const LEAF_FELLED: egui::Color32 = egui::Color32::from_rgb(0x6b, 0x70, 0x3c);
const SELECTED: egui::Color32 = egui::Color32::from_rgb(0xf0, 0xd0, 0x60);
const ACTOR: egui::Color32 = egui::Color32::from_rgb(0x7f, 0xb0, 0xff);

/// Context menu opened on a tree.
#[derive(Clone, Copy, Debug, PartialEq)]
struct ChopMenu {
    tree: TreeId,
    at: egui::Pos2,
}

/// Main application state for the interactive viewer.
///
/// [`Viewer`] glues together:
/// - The forest core: [`Population`] and the [`CpuInstanceRenderer`] it uploads to.
/// - The editable [`ForestConfig`] and the rule text behind it.
/// - An [`OrbitCamera`], the actor position and the open tree menu.
///
/// The typical per-frame update is:
/// 1. Handle UI interactions and input.
/// 2. Advance falling trees by the frame time, unless paused.
/// 3. Draw ground, trees and actor back to front.
///
/// ### Fields
/// - `cfg` - Settings used by the next regrow.
/// - `rules_text` - Rule editor contents; parsed on regrow.
/// - `cfg_error` - Last rejected rule text or config value.
/// - `actor` - World position trees fall away from.
pub struct Viewer {
    cfg: ForestConfig,
    ground: FlatGround,
    population: Population,
    renderer: CpuInstanceRenderer,
    rng: StdRng,

    camera: OrbitCamera,
    actor: Vec3,
    chop_menu: Option<ChopMenu>,

    rules_text: String,
    cfg_error: Option<String>,

    paused: bool,
    last_dt: f32,
}

/// Fixed-seed generator when `seed` is set, otherwise one seeded from the
/// thread generator.
fn forest_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

impl Viewer {
    /// Plants a forest from `cfg` and frames it with the default camera.
    pub fn with_config(cfg: ForestConfig) -> Self {
        let ground = FlatGround::default();
        let mut renderer = CpuInstanceRenderer::new();
        let mut rng = forest_rng(cfg.population.seed);
        let population = Population::build(&cfg, &ground, &mut rng, &mut renderer);
        let rules_text = cfg.grammar.rules.to_text();

        Self {
            cfg,
            ground,
            population,
            renderer,
            rng,
            camera: OrbitCamera::default(),
            actor: Vec3::new(0.0, ground.height_at(0.0, 0.0), 0.0),
            chop_menu: None,
            rules_text,
            cfg_error: None,
            paused: false,
            last_dt: 0.0,
        }
    }

    /// Rebuilds the whole forest from the current settings.
    ///
    /// The rule text is parsed and the config validated first; on failure
    /// the message is kept in `cfg_error` and the old forest stays.
    ///
    /// ### Returns
    /// `true` if a new forest was planted.
    fn regrow(&mut self) -> bool {
        match Rules::parse(&self.rules_text) {
            Ok(rules) => self.cfg.grammar.rules = rules,
            Err(e) => {
                log::warn!("rule text rejected: {e}");
                self.cfg_error = Some(e.to_string());
                return false;
            }
        }
        if let Err(e) = self.cfg.validate() {
            log::warn!("config rejected: {e}");
            self.cfg_error = Some(e.to_string());
            return false;
        }

        self.cfg_error = None;
        self.renderer.clear();
        self.rng = forest_rng(self.cfg.population.seed);
        self.population = Population::build(&self.cfg, &self.ground, &mut self.rng, &mut self.renderer);
        self.chop_menu = None;
        true
    }

    /// Swaps in a species preset, keeping population and fall settings.
    fn load_species(&mut self, grammar: GrammarConfig) {
        self.rules_text = grammar.rules.to_text();
        self.cfg.grammar = grammar;
        self.cfg_error = None;
    }

    fn viewport(rect: egui::Rect) -> Vec2 {
        Vec2::new(rect.width(), rect.height())
    }

    /// Pointer position relative to the viewport's top-left corner.
    fn local(p: egui::Pos2, rect: egui::Rect) -> Vec2 {
        Vec2::new(p.x - rect.min.x, p.y - rect.min.y)
    }

    /// Moves the actor to the ground point under `screen`.
    ///
    /// ### Returns
    /// `false` if the pointer ray misses the ground.
    fn place_actor(&mut self, screen: Vec2, viewport: Vec2) -> bool {
        let Some(ray) = self.camera.view(viewport).ray(screen) else {
            return false;
        };
        let Some(t) = ray.hit_plane_y(self.ground.height) else {
            return false;
        };
        self.actor = ray.at(t);
        log::debug!("actor moved to {:?}", self.actor);
        true
    }

    /// Standing tree under `screen`, if any.
    fn tree_at(&self, screen: Vec2, viewport: Vec2) -> Option<TreeId> {
        let view = self.camera.view(viewport);
        self.population.pick(&self.renderer, &view, screen)
    }

    /// Starts felling `id` away from the actor.
    fn chop(&mut self, id: TreeId) -> bool {
        let started = self.population.start_fall(id, self.actor);
        if !started {
            log::debug!("tree {id} cannot be chopped");
        }
        started
    }

    /// Advances falling trees by a clamped frame time.
    fn advance(&mut self, dt: f32) {
        if self.paused {
            return;
        }
        let dt = dt.clamp(0.0, MAX_FRAME_DT);
        self.population.update(dt, &mut self.renderer);
        self.last_dt = dt;
    }

    /// Helper to draw a labeled `u32` [`egui::DragValue`].
    fn labeled_drag_u32(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut u32,
        range: std::ops::RangeInclusive<u32>,
        speed: f64,
    ) {
        ui.horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(value).range(range).speed(speed));
        });
    }

    /// Helper to draw a labeled `usize` [`egui::DragValue`].
    fn labeled_drag_usize(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut usize,
        range: std::ops::RangeInclusive<usize>,
        speed: f64,
    ) {
        ui.horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(value).range(range).speed(speed));
        });
    }

    /// Helper to draw a labeled `f32` [`egui::DragValue`].
    fn labeled_drag_f32(
        ui: &mut egui::Ui,
        label: &str,
        value: &mut f32,
        range: std::ops::RangeInclusive<f32>,
        speed: f64,
    ) {
        ui.horizontal(|ui| {
            ui.label(label);
            ui.add(egui::DragValue::new(value).range(range).speed(speed));
        });
    }

    /// Builds the top panel UI (regrow, pause, camera distance).
    fn ui_top_panel(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("🌲 Regrow").clicked() {
                    self.regrow();
                }

                if ui
                    .button(if self.paused { "▶ Resume" } else { "⏸ Pause" })
                    .clicked()
                {
                    self.paused = !self.paused;
                }

                ui.separator();
                ui.add(
                    egui::Slider::new(
                        &mut self.camera.distance,
                        OrbitCamera::MIN_DISTANCE..=OrbitCamera::MAX_DISTANCE,
                    )
                    .logarithmic(true)
                    .text("Distance"),
                );

                ui.separator();
                ui.weak("drag: orbit | scroll: zoom | click: move | right click: tree menu");
            });
        });
    }

    /// Builds the bottom status bar (instance counts, falling trees).
    fn ui_status_bar(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.label(format!("dt last = {:.3} s", self.last_dt));
                ui.separator();
                ui.label(format!("felled = {}", self.population.felled_count()));
                ui.label(format!("falling = {}", self.population.falling_count()));
                ui.separator();
                let registry = self.population.registry();
                ui.label(format!("leaves = {}", registry.batch(Category::Leaf).len()));
                ui.label(format!("branches = {}", registry.batch(Category::Branch).len()));
                ui.label(format!("trees = {}", self.population.trees().len()));
            });
        });
    }

    /// Builds the right-hand panel for population, species and fall settings.
    fn ui_config_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("config_panel")
            .resizable(true)
            .default_width(260.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.heading("Config");

                    ui.separator();
                    ui.label("Population");
                    Self::labeled_drag_usize(
                        ui,
                        "count:",
                        &mut self.cfg.population.count,
                        0..=5000,
                        1.0,
                    );
                    Self::labeled_drag_f32(
                        ui,
                        "half_extent:",
                        &mut self.cfg.population.half_extent,
                        0.0..=500.0,
                        1.0,
                    );
                    let mut fixed = self.cfg.population.seed.is_some();
                    if ui.checkbox(&mut fixed, "fixed seed").changed() {
                        self.cfg.population.seed = fixed.then_some(0);
                    }
                    if let Some(seed) = &mut self.cfg.population.seed {
                        ui.add(egui::DragValue::new(seed).prefix("seed = "));
                    }

                    ui.separator();
                    ui.label("Species");
                    ui.horizontal(|ui| {
                        if ui.button("Broadleaf").clicked() {
                            self.load_species(GrammarConfig::broadleaf());
                        }
                        if ui.button("Conifer").clicked() {
                            self.load_species(GrammarConfig::conifer());
                        }
                    });
                    ui.horizontal(|ui| {
                        ui.label("axiom:");
                        ui.text_edit_singleline(&mut self.cfg.grammar.axiom);
                    });
                    Self::labeled_drag_u32(
                        ui,
                        "iterations:",
                        &mut self.cfg.grammar.iterations,
                        0..=forest_core::config::MAX_ITERATIONS,
                        0.05,
                    );
                    let g = &mut self.cfg.grammar;
                    Self::labeled_drag_f32(ui, "angle_deg:", &mut g.angle_deg, 0.0..=180.0, 0.5);
                    Self::labeled_drag_f32(
                        ui,
                        "segment_length:",
                        &mut g.segment_length,
                        0.05..=10.0,
                        0.05,
                    );
                    Self::labeled_drag_f32(
                        ui,
                        "initial_radius:",
                        &mut g.initial_radius,
                        0.01..=2.0,
                        0.01,
                    );
                    Self::labeled_drag_f32(ui, "radius_decay:", &mut g.radius_decay, 0.0..=1.0, 0.01);
                    Self::labeled_drag_f32(ui, "min_radius:", &mut g.min_radius, 0.001..=1.0, 0.005);
                    Self::labeled_drag_f32(
                        ui,
                        "leaf_distance:",
                        &mut g.leaf_distance_threshold,
                        0.0..=50.0,
                        0.1,
                    );
                    Self::labeled_drag_f32(ui, "leaf_size_min:", &mut g.leaf_size_min, 0.0..=5.0, 0.05);
                    Self::labeled_drag_f32(ui, "leaf_size_max:", &mut g.leaf_size_max, 0.0..=5.0, 0.05);

                    ui.label("Rules");
                    ui.add(
                        egui::TextEdit::multiline(&mut self.rules_text)
                            .code_editor()
                            .desired_rows(5)
                            .desired_width(f32::INFINITY),
                    );
                    if let Some(err) = &self.cfg_error {
                        ui.colored_label(egui::Color32::LIGHT_RED, err);
                    }

                    ui.separator();
                    ui.label("Fall");
                    Self::labeled_drag_f32(
                        ui,
                        "duration_secs:",
                        &mut self.cfg.fall.duration_secs,
                        0.05..=10.0,
                        0.05,
                    );
                    Self::labeled_drag_f32(
                        ui,
                        "target_fraction:",
                        &mut self.cfg.fall.target_fraction,
                        0.0..=1.0,
                        0.01,
                    );

                    ui.separator();
                    ui.horizontal(|ui| {
                        if ui.button("Regrow").clicked() {
                            self.regrow();
                        }
                        if ui.button("Reset cfg to default").clicked() {
                            self.cfg = ForestConfig::default();
                            self.rules_text = self.cfg.grammar.rules.to_text();
                            self.cfg_error = None;
                        }
                    });
                });
            });
    }

    /// Builds the floating menu for the tree under the last right click.
    fn ui_chop_menu(&mut self, ctx: &egui::Context) {
        let Some(menu) = self.chop_menu else {
            return;
        };
        let mut close = false;

        egui::Area::new("chop_menu".into())
            .fixed_pos(menu.at)
            .order(egui::Order::Foreground)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.label(format!("tree #{}", menu.tree));
                    if ui.button("Chop").clicked() {
                        self.chop(menu.tree);
                        close = true;
                    }
                    if ui.button("Cancel").clicked() {
                        close = true;
                    }
                });
            });

        if close {
            self.chop_menu = None;
        }
    }

    /// Draws a grid on the ground covering the planted square.
    fn paint_ground(&self, painter: &egui::Painter, rect: egui::Rect) {
        let view = self.camera.view(Self::viewport(rect));
        let stroke = egui::Stroke::new(1.0, egui::Color32::from_gray(60));
        let half = self.cfg.population.half_extent.max(10.0);
        let y = self.ground.height;
        let lines = 10;

        for i in 0..=lines {
            let s = -half + 2.0 * half * i as f32 / lines as f32;
            for (a, b) in [
                (Vec3::new(s, y, -half), Vec3::new(s, y, half)),
                (Vec3::new(-half, y, s), Vec3::new(half, y, s)),
            ] {
                if let (Some(a), Some(b)) = (view.world_to_screen(a), view.world_to_screen(b)) {
                    painter.line_segment([rect.min + egui::vec2(a.x, a.y), rect.min + egui::vec2(b.x, b.y)], stroke);
                }
            }
        }
    }

    /// Draws every uploaded instance, farthest first.
    fn paint_forest(&self, painter: &egui::Painter, rect: egui::Rect) {
        let view = self.camera.view(Self::viewport(rect));
        let eye = self.camera.eye();
        let focal = self.camera.focal_px(rect.height());
        let to_pos = |p: Vec2| rect.min + egui::vec2(p.x, p.y);
        let selected = self.chop_menu.map(|m| m.tree);

        let mut shapes: Vec<(f32, egui::Shape)> = Vec::new();
        for batch in self.population.registry().batches() {
            let Some(uploaded) = batch.handle().and_then(|h| self.renderer.batch(h)) else {
                continue;
            };

            for (t, &owner) in uploaded.instances().iter().zip(batch.owners()) {
                let felled = self.population.tree(owner).is_some_and(TreeEntity::is_dead);
                let scale = t.x_axis.truncate().length();

                match batch.category() {
                    Category::Branch => {
                        let (a, b) = branch_endpoints(t);
                        let (Some(sa), Some(sb)) = (view.world_to_screen(a), view.world_to_screen(b))
                        else {
                            continue;
                        };
                        let depth = ((a + b) * 0.5).distance(eye).max(1e-3);
                        let color = match (selected == Some(owner), felled) {
                            (true, _) => SELECTED,
                            (false, true) => BARK_FELLED,
                            (false, false) => BARK,
                        };
                        let width = (2.0 * scale * focal / depth).max(1.0);
                        shapes.push((
                            depth,
                            egui::Shape::line_segment(
                                [to_pos(sa), to_pos(sb)],
                                egui::Stroke::new(width, color),
                            ),
                        ));
                    }
                    Category::Leaf => {
                        let center = t.w_axis.truncate();
                        let Some(sc) = view.world_to_screen(center) else {
                            continue;
                        };
                        let depth = center.distance(eye).max(1e-3);
                        let color = if felled { LEAF_FELLED } else { LEAF };
                        let radius = (scale * focal / depth).max(1.0);
                        shapes.push((depth, egui::Shape::circle_filled(to_pos(sc), radius, color)));
                    }
                }
            }
        }

        shapes.sort_by(|a, b| b.0.total_cmp(&a.0));
        painter.extend(shapes.into_iter().map(|(_, s)| s));

        if let Some(p) = view.world_to_screen(self.actor) {
            painter.circle(to_pos(p), 6.0, ACTOR, egui::Stroke::new(1.5, egui::Color32::WHITE));
        }
    }

    /// Builds the central panel where the forest is drawn and interacted with.
    fn ui_central_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(egui::Color32::from_rgb(0x1d, 0x24, 0x2b)))
            .show(ctx, |ui| {
                let response = ui.allocate_response(ui.available_size(), egui::Sense::click_and_drag());
                let rect = response.rect;
                let viewport = Self::viewport(rect);
                let painter = ui.painter_at(rect);

                // Orbit with drag.
                if response.dragged_by(egui::PointerButton::Primary) {
                    let delta = response.drag_delta();
                    self.camera.orbit(Vec2::new(delta.x, delta.y));
                }

                if response.hovered() {
                    let scroll = ui.ctx().input(|i| i.raw_scroll_delta.y);
                    if scroll != 0.0 {
                        self.camera.zoom(scroll);
                    }
                }

                if response.clicked()
                    && let Some(p) = response.interact_pointer_pos()
                {
                    self.chop_menu = None;
                    self.place_actor(Self::local(p, rect), viewport);
                }

                if response.secondary_clicked()
                    && let Some(p) = response.interact_pointer_pos()
                {
                    self.chop_menu = self
                        .tree_at(Self::local(p, rect), viewport)
                        .map(|tree| ChopMenu { tree, at: p });
                }

                self.paint_ground(&painter, rect);
                self.paint_forest(&painter, rect);
            });
    }
}

impl App for Viewer {
    /// eframe callback that builds all UI panels for each frame.
    ///
    /// This method:
    /// - Renders the top control bar, status bar and config panel.
    /// - Advances falling trees by the frame time.
    /// - Draws the forest and the tree menu and handles interactions.
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui_top_panel(ctx);
        self.ui_status_bar(ctx);
        self.ui_config_panel(ctx);

        let dt = ctx.input(|i| i.stable_dt);
        self.advance(dt);

        self.ui_central_panel(ctx);
        self.ui_chop_menu(ctx);

        if !self.paused && self.population.falling_count() > 0 {
            ctx.request_repaint();
        }
    }
}
