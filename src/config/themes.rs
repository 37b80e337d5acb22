use ratatui::style::{Color, Modifier, Style};

use super::ThemeName;

/// Colours used by the edit surface and the rendered preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub heading: Color,
    pub heading_marker: Color,
    pub code: Color,
    pub code_bg: Color,
    pub link: Color,
}

impl Palette {
    pub fn for_theme(theme: ThemeName) -> Self {
        match theme {
            ThemeName::Dark => Self {
                text: Color::Gray,
                muted: Color::DarkGray,
                accent: Color::Cyan,
                heading: Color::White,
                heading_marker: Color::Magenta,
                code: Color::LightRed,
                code_bg: Color::Black,
                link: Color::LightBlue,
            },
            ThemeName::Light => Self {
                text: Color::Black,
                muted: Color::Gray,
                accent: Color::Blue,
                heading: Color::Black,
                heading_marker: Color::Magenta,
                code: Color::Red,
                code_bg: Color::White,
                link: Color::Blue,
            },
            ThemeName::HighContrast => Self {
                text: Color::White,
                muted: Color::Gray,
                accent: Color::Yellow,
                heading: Color::Yellow,
                heading_marker: Color::LightMagenta,
                code: Color::LightGreen,
                code_bg: Color::Black,
                link: Color::LightCyan,
            },
            ThemeName::Solarized => Self {
                text: Color::Rgb(131, 148, 150),
                muted: Color::Rgb(88, 110, 117),
                accent: Color::Rgb(38, 139, 210),
                heading: Color::Rgb(181, 137, 0),
                heading_marker: Color::Rgb(211, 54, 130),
                code: Color::Rgb(42, 161, 152),
                code_bg: Color::Rgb(7, 54, 66),
                link: Color::Rgb(108, 113, 196),
            },
        }
    }

    pub fn base(&self) -> Style {
        Style::default().fg(self.text)
    }

    pub fn muted(&self) -> Style {
        Style::default()
            .fg(self.muted)
            .add_modifier(Modifier::ITALIC)
    }

    pub fn heading_marker(&self) -> Style {
        Style::default()
            .fg(self.heading_marker)
            .add_modifier(Modifier::DIM)
    }

    /// Terminals cannot enlarge text, so higher-level headings get heavier emphasis instead.
    pub fn heading(&self, level: u8) -> Style {
        let style = Style::default()
            .fg(self.heading)
            .add_modifier(Modifier::BOLD);
        if level <= 1 {
            style.add_modifier(Modifier::UNDERLINED)
        } else {
            style
        }
    }

    pub fn code(&self) -> Style {
        Style::default().fg(self.code).bg(self.code_bg)
    }

    pub fn link(&self) -> Style {
        Style::default()
            .fg(self.link)
            .add_modifier(Modifier::UNDERLINED)
    }
}
