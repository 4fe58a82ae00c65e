use eframe::egui::{
    self,
    text::{LayoutJob, TextFormat},
    FontId, Stroke, TextStyle,
};
use pulldown_cmark::{html, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options
}

/// Renders markdown into HTML.
pub fn to_html(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, options());
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Escapes text for inclusion in HTML without interpreting it as markdown.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    html::push_html(&mut out, std::iter::once(Event::Text(text.into())));
    out
}

fn is_line_break(tag: &str) -> bool {
    let name = tag
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_end_matches('/')
        .trim();
    name.eq_ignore_ascii_case("br")
}

/// Inline state while walking the event stream.
#[derive(Default)]
struct Inline {
    strong: u32,
    emphasis: u32,
    strikethrough: u32,
    link: u32,
    code_block: bool,
    /// Just emitted a list marker; the item's first paragraph continues on its line.
    item_head: bool,
    table_head: bool,
    /// Cells already emitted in the current table row.
    cell: usize,
    heading: Option<HeadingLevel>,
}

/// Lays markdown out as a single egui text job.
///
/// egui has no bold face in its default fonts, so strong text is drawn in the
/// theme's strong colour instead.
pub fn layout_job(markdown: &str, style: &egui::Style) -> LayoutJob {
    let body = style
        .text_styles
        .get(&TextStyle::Body)
        .cloned()
        .unwrap_or_else(|| FontId::proportional(14.0));
    let mono = style
        .text_styles
        .get(&TextStyle::Monospace)
        .cloned()
        .unwrap_or_else(|| FontId::monospace(13.0));
    let visuals = &style.visuals;

    let mut job = LayoutJob::default();
    let mut state = Inline::default();
    // Ordered list counters; `None` for bullet lists.
    let mut lists: Vec<Option<u64>> = Vec::new();

    let format_for = |state: &Inline| {
        let mut format = TextFormat {
            font_id: body.clone(),
            color: visuals.text_color(),
            ..Default::default()
        };
        if let Some(level) = state.heading {
            let scale = match level {
                HeadingLevel::H1 => 1.6,
                HeadingLevel::H2 => 1.35,
                HeadingLevel::H3 => 1.2,
                _ => 1.1,
            };
            format.font_id = FontId::new(body.size * scale, body.family.clone());
            format.color = visuals.strong_text_color();
        }
        if state.strong > 0 {
            format.color = visuals.strong_text_color();
        }
        if state.emphasis > 0 {
            format.italics = true;
        }
        if state.strikethrough > 0 {
            format.strikethrough = Stroke::new(1.0, format.color);
        }
        if state.link > 0 {
            format.color = visuals.hyperlink_color;
            format.underline = Stroke::new(1.0, visuals.hyperlink_color);
        }
        if state.table_head {
            format.color = visuals.strong_text_color();
        }
        if state.code_block {
            format.font_id = mono.clone();
            format.background = visuals.extreme_bg_color;
        }
        format
    };

    let push = |job: &mut LayoutJob, text: &str, format: TextFormat| {
        job.append(text, 0.0, format);
    };

    for event in Parser::new_ext(markdown, options()) {
        match event {
            Event::Start(tag) => match tag {
                Tag::Strong => state.strong += 1,
                Tag::Emphasis => state.emphasis += 1,
                Tag::Strikethrough => state.strikethrough += 1,
                Tag::Link { .. } => state.link += 1,
                Tag::Heading { level, .. } => {
                    ensure_blank_line(&mut job, &format_for(&state));
                    state.heading = Some(level);
                }
                Tag::Paragraph if state.item_head => {}
                Tag::Paragraph => ensure_blank_line(&mut job, &format_for(&state)),
                Tag::CodeBlock(kind) => {
                    ensure_blank_line(&mut job, &format_for(&state));
                    state.code_block = true;
                    if let CodeBlockKind::Fenced(lang) = kind {
                        if !lang.is_empty() {
                            let mut format = format_for(&state);
                            format.color = visuals.weak_text_color();
                            push(&mut job, &format!("{lang}\n"), format);
                        }
                    }
                }
                Tag::List(start) => {
                    if lists.is_empty() {
                        ensure_blank_line(&mut job, &format_for(&state));
                    }
                    lists.push(start);
                }
                Tag::Item => {
                    ensure_newline(&mut job, &format_for(&state));
                    let indent = "    ".repeat(lists.len().saturating_sub(1));
                    let marker = match lists.last_mut() {
                        Some(Some(n)) => {
                            let marker = format!("{indent}{n}. ");
                            *n += 1;
                            marker
                        }
                        _ => format!("{indent}• "),
                    };
                    push(&mut job, &marker, format_for(&state));
                    state.item_head = true;
                }
                Tag::Table(_) => ensure_blank_line(&mut job, &format_for(&state)),
                Tag::TableHead => {
                    state.table_head = true;
                    state.cell = 0;
                }
                Tag::TableRow => {
                    ensure_newline(&mut job, &format_for(&state));
                    state.cell = 0;
                }
                Tag::TableCell => {
                    if state.cell > 0 {
                        let mut format = format_for(&state);
                        format.color = visuals.weak_text_color();
                        push(&mut job, " | ", format);
                    }
                    state.cell += 1;
                }
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Strong => state.strong = state.strong.saturating_sub(1),
                TagEnd::Emphasis => state.emphasis = state.emphasis.saturating_sub(1),
                TagEnd::Strikethrough => {
                    state.strikethrough = state.strikethrough.saturating_sub(1)
                }
                TagEnd::Link => state.link = state.link.saturating_sub(1),
                TagEnd::Heading(_) => state.heading = None,
                TagEnd::CodeBlock => state.code_block = false,
                TagEnd::List(_) => {
                    lists.pop();
                }
                TagEnd::TableHead => {
                    state.table_head = false;
                    ensure_newline(&mut job, &format_for(&state));
                }
                TagEnd::TableRow => ensure_newline(&mut job, &format_for(&state)),
                _ => {}
            },
            Event::Text(text) => {
                state.item_head = false;
                push(&mut job, &text, format_for(&state));
            }
            Event::Code(code) => {
                state.item_head = false;
                let mut format = format_for(&state);
                format.font_id = mono.clone();
                format.background = visuals.code_bg_color;
                push(&mut job, &code, format);
            }
            Event::InlineHtml(tag) if is_line_break(&tag) => {
                push(&mut job, "\n", format_for(&state))
            }
            Event::Html(raw) | Event::InlineHtml(raw) => {
                state.item_head = false;
                push(&mut job, &raw, format_for(&state));
            }
            Event::SoftBreak => push(&mut job, " ", format_for(&state)),
            Event::HardBreak => push(&mut job, "\n", format_for(&state)),
            Event::Rule => {
                ensure_newline(&mut job, &format_for(&state));
                let mut format = format_for(&state);
                format.color = visuals.weak_text_color();
                push(&mut job, "───────────────────\n", format);
            }
            _ => {}
        }
    }

    // Code blocks and rules end with their own newline.
    let len = job.text.trim_end_matches('\n').len();
    job.text.truncate(len);
    for section in &mut job.sections {
        section.byte_range.start = section.byte_range.start.min(len);
        section.byte_range.end = section.byte_range.end.min(len);
    }
    job.sections.retain(|s| !s.byte_range.is_empty());
    job
}

fn ensure_newline(job: &mut LayoutJob, format: &TextFormat) {
    if !job.text.is_empty() && !job.text.ends_with('\n') {
        job.append("\n", 0.0, format.clone());
    }
}

fn ensure_blank_line(job: &mut LayoutJob, format: &TextFormat) {
    if job.text.is_empty() {
        return;
    }
    ensure_newline(job, format);
    if !job.text.ends_with("\n\n") {
        job.append("\n", 0.0, format.clone());
    }
}
