//! Tree-shaped rendering of translation spans and events on stderr.

use crossterm::style::{style, Color, Styler};
use std::fmt::{self, Write as _};
use std::io::{stderr, Stderr, Write};
use tracing::field::{Field, Visit};
use tracing::span::Attributes;
use tracing::{Event, Id, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

pub struct Tree {
    indent: usize,
    stderr: Stderr,
}

/// The rendered header of a span, stored in its extensions when it is created.
struct SpanHeader(String);

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: String,
}

impl Tree {
    pub fn new(indent: usize) -> Tree {
        Tree {
            indent,
            stderr: stderr(),
        }
    }

    fn print(&self, depth: usize, line: &str) {
        let mut out = self.stderr.lock();
        let _ = writeln!(
            out,
            "{:indent$}{}",
            "",
            line,
            indent = self.indent * depth
        );
    }
}

impl FieldVisitor {
    fn finish(self, name: &str, color: Color) -> String {
        let mut line = style(name).with(color).to_string();

        if !self.message.is_empty() {
            line.push(' ');
            line.push_str(&self.message);
        }
        if !self.fields.is_empty() {
            let _ = write!(line, " {}{}{}", '['.bold(), self.fields, ']'.bold());
        }

        line
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            if !self.fields.is_empty() {
                self.fields.push_str(", ");
            }
            let _ = write!(self.fields, "{}={:?}", field.name().bold(), value);
        }
    }
}

fn level_color(level: &Level) -> Color {
    if *level == Level::ERROR {
        Color::Red
    } else if *level == Level::WARN {
        Color::Yellow
    } else if *level == Level::INFO {
        Color::Green
    } else if *level == Level::DEBUG {
        Color::Blue
    } else {
        Color::DarkGrey
    }
}

impl<S> Layer<S> for Tree
where
    S: Subscriber,
    S: for<'a> LookupSpan<'a>,
{
    fn new_span(&self, attrs: &Attributes, id: &Id, ctx: Context<S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        let header = visitor.finish(attrs.metadata().name(), Color::Cyan);

        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanHeader(header));
        }
    }

    fn on_enter(&self, id: &Id, ctx: Context<'_, S>) {
        let span = match ctx.span(id) {
            Some(span) => span,
            None => return,
        };

        let extensions = span.extensions();
        if let Some(SpanHeader(header)) = extensions.get::<SpanHeader>() {
            let depth = ctx.scope().count().saturating_sub(1);
            self.print(depth, header);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let level = metadata.level();
        let line = visitor.finish(&level.to_string(), level_color(level));

        self.print(ctx.scope().count(), &line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn spans_and_events_are_accepted() {
        let subscriber = tracing_subscriber::Registry::default().with(Tree::new(2));

        tracing::subscriber::with_default(subscriber, || {
            let span = debug_span!("measure", entries = 2);
            let _guard = span.enter();
            debug!(address = 0x0040_0018, "function entry");
            trace!("inner");
        });
    }

    #[test]
    fn events_show_message_and_fields() {
        let mut visitor = FieldVisitor::default();
        visitor.message.push_str("wrote");
        visitor.fields.push_str("words=22");

        let line = visitor.finish("INFO", Color::Green);
        assert!(line.contains("INFO"));
        assert!(line.contains("wrote"));
        assert!(line.contains("words=22"));
    }
}
