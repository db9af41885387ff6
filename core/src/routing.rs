// Notification click routing
//
// An open window wins over opening a new one. Among open windows the first in
// enumeration order is focused.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickAction<C> {
    Focus(C),
    Open(String),
    /// No window to focus and the host cannot open one.
    Ignore,
}

pub fn route_click<C>(
    clients: Vec<C>,
    can_open_window: bool,
    data_url: Option<&str>,
    default_url: &str,
) -> ClickAction<C> {
    if let Some(client) = clients.into_iter().next() {
        return ClickAction::Focus(client);
    }

    if !can_open_window {
        return ClickAction::Ignore;
    }

    let url = data_url.filter(|u| !u.is_empty()).unwrap_or(default_url);
    ClickAction::Open(url.to_string())
}
