//! Main application

use crate::input::{hotkeys, Hotkey, KeyMap, FAST_FORWARD_KEY};
use crate::presenter::{EguiPresenter, SharedScreen};
use cb_audio::AudioOutput;
use cb_core::{Config, CoreFactory};
use cb_integration::{CoreBridge, SLOT_COUNT};
use cb_video::VideoSurface;
use eframe::egui;
use std::path::PathBuf;
use std::sync::Arc;

/// Main application state
pub struct CorebridgeApp {
    config: Config,
    bridge: CoreBridge,
    surface: Arc<VideoSurface>,
    screen: SharedScreen,
    audio: Option<AudioOutput>,
    keymap: KeyMap,
    /// ROM path typed into the menu
    rom_path: String,
    fast_forward_held: bool,
    /// Last message for the status bar
    status: Option<String>,
}

impl CorebridgeApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: Config,
        factory: Arc<dyn CoreFactory>,
        rom: Option<PathBuf>,
    ) -> Self {
        let bridge = CoreBridge::new(factory, config.clone());
        let (presenter, screen) = EguiPresenter::new(cc.egui_ctx.clone());
        let surface = VideoSurface::new(Box::new(presenter));
        surface.attach_bridge(&bridge);

        let mut app = Self {
            keymap: KeyMap::from_config(&config.input.keyboard_mapping),
            config,
            bridge,
            surface,
            screen,
            audio: None,
            rom_path: rom
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            fast_forward_held: false,
            status: None,
        };

        if let Err(e) = app.surface.start_display() {
            app.report(format!("Display unavailable: {}", e));
        }
        if let Some(rom) = rom {
            app.start_session(rom);
        }
        app
    }

    fn report(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.status = Some(message);
    }

    fn start_session(&mut self, rom: PathBuf) {
        if let Err(e) = self.bridge.start(&rom) {
            self.report(format!("Failed to start {}: {}", rom.display(), e));
            return;
        }
        self.status = None;

        let Some(handle) = self.bridge.handle() else {
            return;
        };
        let mut audio = AudioOutput::new(handle, &self.config.audio);
        match audio.start() {
            Ok(_) => self.audio = Some(audio),
            Err(e) => self.report(format!("Audio disabled: {}", e)),
        }
    }

    fn stop_session(&mut self) {
        if let Some(mut audio) = self.audio.take() {
            audio.stop();
        }
        self.bridge.stop();
        self.screen.lock().drawn = None;
    }

    fn save_slot(&mut self, slot: u32) {
        match self.bridge.save_state(slot) {
            Ok(()) => self.status = Some(format!("Saved slot {}", slot)),
            Err(e) => self.report(format!("Save to slot {} failed: {}", slot, e)),
        }
    }

    fn load_slot(&mut self, slot: u32) {
        match self.bridge.load_state(slot) {
            Ok(()) => self.status = Some(format!("Loaded slot {}", slot)),
            Err(e) => self.report(format!("Load from slot {} failed: {}", slot, e)),
        }
    }

    fn toggle_pause(&self) {
        if self.bridge.is_paused() {
            self.bridge.resume();
        } else {
            self.bridge.pause();
        }
    }

    fn set_integer_scaling(&mut self, enabled: bool) {
        if let Err(e) = self.bridge.set_lock_integer_scaling(enabled) {
            self.report(format!("Integer scaling: {}", e));
        }
    }

    fn handle_input(&mut self, ctx: &egui::Context) {
        // Typing into a text field must not drive the keypad
        let typing = ctx.wants_keyboard_input();
        let (keys, fast_forward, actions) = ctx.input(|i| {
            if typing {
                (Default::default(), false, Vec::new())
            } else {
                (
                    self.keymap.held(i),
                    i.key_down(FAST_FORWARD_KEY),
                    hotkeys(|key| i.key_pressed(key)),
                )
            }
        });

        self.bridge.set_keys(keys);
        if fast_forward != self.fast_forward_held {
            self.fast_forward_held = fast_forward;
            self.bridge.set_fast_forward_held(fast_forward);
        }

        for action in actions {
            match action {
                Hotkey::SaveSlot(slot) => self.save_slot(slot),
                Hotkey::LoadSlot(slot) => self.load_slot(slot),
                Hotkey::TogglePause => self.toggle_pause(),
                Hotkey::ToggleIntegerScaling => {
                    let enabled = !self.bridge.options().lock_integer_scaling;
                    self.set_integer_scaling(enabled);
                }
                Hotkey::Rewind => {
                    if !self.bridge.rewind() {
                        self.status = Some("Nothing to rewind".to_string());
                    }
                }
            }
        }
    }

    fn show_menu(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    ui.label("ROM path");
                    ui.text_edit_singleline(&mut self.rom_path);
                    let can_start = !self.bridge.is_running() && !self.rom_path.is_empty();
                    if ui.add_enabled(can_start, egui::Button::new("Start")).clicked() {
                        let rom = PathBuf::from(self.rom_path.trim());
                        self.start_session(rom);
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("Exit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });

                let running = self.bridge.is_running();
                ui.menu_button("Emulation", |ui| {
                    let pause_label = if self.bridge.is_paused() { "Resume" } else { "Pause" };
                    if ui.add_enabled(running, egui::Button::new(pause_label)).clicked() {
                        self.toggle_pause();
                        ui.close_menu();
                    }
                    if ui.add_enabled(running, egui::Button::new("Reset")).clicked() {
                        self.bridge.reset();
                        ui.close_menu();
                    }
                    if ui.add_enabled(running, egui::Button::new("Rewind")).clicked() {
                        self.bridge.rewind();
                        ui.close_menu();
                    }
                    let mut fast_forward = self.bridge.is_fast_forward();
                    if ui.checkbox(&mut fast_forward, "Fast forward").changed() {
                        self.bridge.set_fast_forward(fast_forward);
                    }
                    ui.separator();
                    if ui.add_enabled(running, egui::Button::new("Stop")).clicked() {
                        self.stop_session();
                        ui.close_menu();
                    }
                });

                ui.menu_button("State", |ui| {
                    ui.add_enabled_ui(running, |ui| {
                        ui.menu_button("Save", |ui| {
                            for slot in 1..SLOT_COUNT {
                                if ui.button(format!("Slot {}", slot)).clicked() {
                                    self.save_slot(slot);
                                    ui.close_menu();
                                }
                            }
                        });
                        ui.menu_button("Load", |ui| {
                            let occupied = self.bridge.occupied_slots();
                            for slot in 1..SLOT_COUNT {
                                let button = egui::Button::new(format!("Slot {}", slot));
                                if ui.add_enabled(occupied.contains(&slot), button).clicked() {
                                    self.load_slot(slot);
                                    ui.close_menu();
                                }
                            }
                        });
                    });
                });

                ui.menu_button("Video", |ui| {
                    let mut integer = self.bridge.options().lock_integer_scaling;
                    if ui.checkbox(&mut integer, "Integer scaling").changed() {
                        self.set_integer_scaling(integer);
                    }
                    let mut lock_aspect = self.bridge.options().lock_aspect_ratio;
                    if ui.checkbox(&mut lock_aspect, "Lock aspect ratio").changed() {
                        if let Err(e) = self.bridge.set_lock_aspect_ratio(lock_aspect) {
                            self.report(format!("Aspect ratio: {}", e));
                        }
                    }
                    ui.separator();
                    ui.menu_button("Palette", |ui| {
                        let current = self.bridge.options().gb_palette_preset;
                        for name in self.bridge.list_gb_palette_presets() {
                            if ui.selectable_label(current == name, name.as_str()).clicked() {
                                if let Err(e) = self.bridge.set_gb_palette_preset(&name) {
                                    self.report(format!("Palette: {}", e));
                                }
                                ui.close_menu();
                            }
                        }
                    });
                });
            });
        });
    }

    fn show_status(&self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                match self.bridge.rom_info() {
                    Some(info) => {
                        ui.label(format!("{} ({:?})", info.title, info.platform));
                        ui.separator();
                        ui.label(format!("Frame {}", self.bridge.frame_count()));
                        if self.bridge.is_paused() {
                            ui.separator();
                            ui.colored_label(egui::Color32::YELLOW, "Paused");
                        } else if self.bridge.is_fast_forward() {
                            ui.separator();
                            ui.colored_label(egui::Color32::LIGHT_BLUE, "Fast forward");
                        }
                    }
                    None => {
                        ui.label("No ROM running");
                    }
                }
                if let Some(status) = &self.status {
                    ui.separator();
                    ui.label(status);
                }
            });
        });
    }

    fn show_screen(&self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let area = ui.available_rect_before_wrap();
                self.screen.lock().viewport = (area.width() as u32, area.height() as u32);

                if let Err(e) = self.surface.display_frame() {
                    tracing::trace!("Display skipped: {}", e);
                }

                let Some(drawn) = self.screen.lock().drawn else {
                    return;
                };
                let target = egui::Rect::from_min_size(
                    area.min + egui::vec2(drawn.target.x as f32, drawn.target.y as f32),
                    egui::vec2(drawn.target.width as f32, drawn.target.height as f32),
                );
                let uv = egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
                ui.painter()
                    .image(drawn.texture, target, uv, egui::Color32::WHITE);
            });
    }
}

impl eframe::App for CorebridgeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_input(ctx);
        self.show_menu(ctx);
        self.show_status(ctx);
        self.show_screen(ctx);

        if self.bridge.is_running() {
            ctx.request_repaint();
        }
    }
}

impl Drop for CorebridgeApp {
    fn drop(&mut self) {
        self.stop_session();
        self.surface.detach_bridge(&self.bridge);
        self.surface.stop_display();
    }
}

/// Run the application
pub fn run(
    config: Config,
    factory: Arc<dyn CoreFactory>,
    rom: Option<PathBuf>,
) -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([720.0, 520.0])
            .with_min_inner_size([240.0, 160.0]),
        ..Default::default()
    };

    eframe::run_native(
        "corebridge",
        options,
        Box::new(move |cc| Ok(Box::new(CorebridgeApp::new(cc, config, factory, rom)))),
    )
}
