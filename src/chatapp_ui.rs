use eframe::egui;
use std::time::Duration;

use crate::chatapp::ChatApp;
use crate::chatstate::{Entry, Speaker};
use crate::geminiclient::RemoteModel;
use crate::markdown;

pub const TITLE: &str = "Sutrabot: Your Wise Guide";

const ACCENT: egui::Color32 = egui::Color32::from_rgb(0x4C, 0xAF, 0x50);
const PENDING: egui::Color32 = egui::Color32::from_rgb(0xFF, 0x98, 0x00);
const ERROR: egui::Color32 = egui::Color32::from_rgb(0xE5, 0x53, 0x4B);

impl<M: RemoteModel> eframe::App for ChatApp<M> {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_response();

        // The worker wakes us when it finishes; this keeps the spinner moving meanwhile.
        if self.state.is_pending() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }

        egui::TopBottomPanel::top("api_key_bar").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.label("API key:");
                let field = egui::TextEdit::singleline(&mut self.api_key_input)
                    .password(true)
                    .hint_text("Enter your API key here...")
                    .desired_width(f32::INFINITY);
                if ui.add(field).changed() {
                    self.update_api_key();
                }
            });
            ui.add_space(4.0);
        });

        egui::TopBottomPanel::bottom("input_area").show(ctx, |ui| {
            self.render_input_area(ui, ctx);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.label(egui::RichText::new(TITLE).size(22.0).strong().color(ACCENT));
            });
            ui.add_space(8.0);

            egui::ScrollArea::vertical()
                .auto_shrink([false; 2])
                .stick_to_bottom(true)
                .show(ui, |ui| {
                    self.render_entries(ui);
                });
        });
    }
}

impl<M: RemoteModel> ChatApp<M> {
    fn render_input_area(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        ui.add_space(6.0);
        let response = ui.add(
            egui::TextEdit::singleline(&mut self.input)
                .hint_text("Ask a question...")
                .desired_width(f32::INFINITY),
        );
        let enter_pressed =
            response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

        ui.add_space(4.0);
        ui.horizontal(|ui| {
            let can_submit = self.state.can_submit();
            let ask = ui.add_enabled(can_submit, egui::Button::new("Ask").min_size(egui::vec2(120.0, 32.0)));
            if ask.clicked() || (enter_pressed && can_submit) {
                self.send_message(ctx);
                response.request_focus();
            }

            if self.state.is_pending() {
                ui.spinner();
                ui.label(egui::RichText::new("⌛ Loading...").strong().color(PENDING));
                if ui.button("Cancel").clicked() {
                    self.cancel_request();
                }
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.add_enabled(can_submit, egui::Button::new("New Chat")).clicked() {
                    self.clear_chat();
                }
            });
        });
        ui.add_space(6.0);
    }

    fn render_entries(&self, ui: &mut egui::Ui) {
        let entries = self.state.entries();
        if entries.is_empty() && !self.session.has_credential() {
            ui.label(
                egui::RichText::new("Set GEMINI_API_KEY or enter a key above to start.")
                    .color(ui.visuals().weak_text_color()),
            );
        }
        for entry in entries {
            self.render_entry(ui, entry);
            ui.add_space(8.0);
        }
    }

    fn render_entry(&self, ui: &mut egui::Ui, entry: &Entry) {
        match entry.speaker {
            Speaker::User => {
                ui.horizontal_wrapped(|ui| {
                    ui.label(egui::RichText::new("User:").strong().color(ACCENT));
                    ui.label(&entry.raw);
                });
            }
            Speaker::Assistant => {
                ui.label(egui::RichText::new("Sutrabot:").strong().color(ACCENT));
                let mut job = markdown::layout_job(&entry.raw, ui.style());
                job.wrap.max_width = ui.available_width();
                ui.label(job).context_menu(|ui| {
                    if ui.button("Copy text").clicked() {
                        ui.output_mut(|o| o.copied_text = entry.raw.clone());
                        ui.close_menu();
                    }
                    if ui.button("Copy as HTML").clicked() {
                        ui.output_mut(|o| o.copied_text = entry.markup.clone());
                        ui.close_menu();
                    }
                });
            }
            Speaker::Error => {
                ui.label(egui::RichText::new("Error:").strong().color(ERROR));
                ui.label(egui::RichText::new(&entry.raw).color(ERROR));
            }
        }
    }
}
