//! Server-rendered HTML for every dashboard screen.

use crate::session::SessionUser;
use crate::store::{ImageMatch, Role, UserSummary};

/// One inline status message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flash {
    Success(String),
    Warning(String),
    Error(String),
}

impl Flash {
    fn class(&self) -> &'static str {
        match self {
            Flash::Success(_) => "success",
            Flash::Warning(_) => "warning",
            Flash::Error(_) => "error",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Flash::Success(t) | Flash::Warning(t) | Flash::Error(t) => t,
        }
    }
}

/// Main panel content.
pub enum Screen<'a> {
    Login,
    Signup,
    Admin,
    Officer { found: Option<&'a ImageMatch> },
    Administrator { users: &'a [UserSummary] },
}

const STYLE: &str = "
body{font-family:sans-serif;margin:0;display:flex;min-height:100vh}
nav{width:14rem;background:#f0f2f6;padding:1rem}
main{flex:1;padding:1.5rem 2rem;max-width:48rem}
form{margin:1rem 0}label{display:block;margin:.5rem 0}
.flash{padding:.6rem 1rem;border-radius:4px;margin:.5rem 0}
.success{background:#d4edda}.warning{background:#fff3cd}.error{background:#f8d7da}
table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:.3rem .6rem}
img.match{max-width:100%;margin-top:1rem}
";

/// Escape text for use in HTML element content and quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Full page: sidebar, messages, then the screen.
pub fn page(user: Option<&SessionUser>, flashes: &[Flash], screen: &Screen<'_>) -> String {
    let mut body = String::new();
    for flash in flashes {
        body.push_str(&format!(
            "<div class=\"flash {}\">{}</div>",
            flash.class(),
            escape(flash.text())
        ));
    }
    body.push_str(&match screen {
        Screen::Login => login_form(),
        Screen::Signup => signup_form(),
        Screen::Admin => admin_dashboard(),
        Screen::Officer { found } => officer_dashboard(*found),
        Screen::Administrator { users } => administrator_panel(users),
    });

    layout(&sidebar(user), &body)
}

/// Generic page for failures the user cannot fix.
pub fn error_page() -> String {
    layout(
        &sidebar(None),
        "<h1>Something went wrong</h1><p>The request could not be completed. Please try again later.</p>\
         <p><a href=\"/\">Back to the dashboard</a></p>",
    )
}

fn layout(sidebar: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>SuspectSight</title>\
         <style>{STYLE}</style></head><body>{sidebar}<main>{body}</main></body></html>"
    )
}

fn sidebar(user: Option<&SessionUser>) -> String {
    let inner = match user {
        None => "<h3>Navigation</h3><ul><li><a href=\"/\">Login</a></li>\
                 <li><a href=\"/?view=signup\">Signup</a></li></ul>"
            .to_string(),
        Some(u) => format!(
            "<p>Logged in as {} ({})</p>\
             <form method=\"post\" action=\"/logout\"><button type=\"submit\">Logout</button></form>",
            escape(&u.username),
            u.role
        ),
    };
    format!("<nav><h2>SuspectSight</h2>{inner}</nav>")
}

fn role_options(roles: &[Role]) -> String {
    roles
        .iter()
        .map(|r| format!("<option value=\"{r}\">{r}</option>"))
        .collect()
}

fn login_form() -> String {
    "<h1>Login</h1>\
     <form method=\"post\" action=\"/login\">\
     <label>Username <input name=\"username\" required></label>\
     <label>Password <input name=\"password\" type=\"password\" required></label>\
     <button type=\"submit\">Login</button></form>"
        .to_string()
}

fn signup_form() -> String {
    format!(
        "<h1>Signup</h1>\
         <form method=\"post\" action=\"/signup\">\
         <label>Username <input name=\"username\" required></label>\
         <label>Password <input name=\"password\" type=\"password\" required></label>\
         <label>Role <select name=\"role\">{}</select></label>\
         <button type=\"submit\">Signup</button></form>",
        role_options(&Role::ALL)
    )
}

fn admin_dashboard() -> String {
    "<h1>Admin Dashboard</h1>\
     <form method=\"post\" action=\"/admin/upload\" enctype=\"multipart/form-data\">\
     <label>Upload Image <input name=\"image\" type=\"file\" accept=\"image/*\"></label>\
     <label>Name <input name=\"name\"></label>\
     <label>Age <input name=\"age\"></label>\
     <label>Place <input name=\"place\"></label>\
     <label>Crime <input name=\"crime\"></label>\
     <label>Phone Number <input name=\"phone\"></label>\
     <button type=\"submit\">Submit</button></form>"
        .to_string()
}

fn officer_dashboard(found: Option<&ImageMatch>) -> String {
    let mut html = "<h1>Officer Dashboard</h1>\
        <form method=\"post\" action=\"/officer/lookup\" enctype=\"multipart/form-data\">\
        <label>Upload Image <input name=\"image\" type=\"file\" accept=\"image/*\"></label>\
        <button type=\"submit\">Search</button></form>"
        .to_string();

    if let Some(m) = found {
        let d = &m.image.details;
        html.push_str(&format!(
            "<section class=\"result\"><p>Place: {}, Crime: {}, Phone: {}</p>\
             <figure><img class=\"match\" src=\"{}\" alt=\"Matched Image\">\
             <figcaption>Matched Image</figcaption></figure></section>",
            escape(&d.place),
            escape(&d.crime),
            escape(&d.phone),
            escape(&m.image.image_url),
        ));
    }
    html
}

fn administrator_panel(users: &[UserSummary]) -> String {
    let rows: String = users
        .iter()
        .map(|u| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&u.username),
                u.role,
                u.image_count,
                u.created_at.format("%Y-%m-%d %H:%M")
            )
        })
        .collect();

    format!(
        "<h1>Administrator Panel</h1><h2>Manage Users</h2>\
         <h3>Add User</h3>\
         <form method=\"post\" action=\"/administrator/users\">\
         <label>New Username <input name=\"username\" required></label>\
         <label>New Password <input name=\"password\" type=\"password\" required></label>\
         <label>Role <select name=\"role\">{}</select></label>\
         <button type=\"submit\">Add User</button></form>\
         <h3>Remove User</h3>\
         <form method=\"post\" action=\"/administrator/users/remove\">\
         <label>Username to Remove <input name=\"username\" required></label>\
         <button type=\"submit\">Remove User</button></form>\
         <h3>Current Users</h3>\
         <table><tr><th>Username</th><th>Role</th><th>Images</th><th>Created</th></tr>{rows}</table>",
        role_options(&Role::ASSIGNABLE)
    )
}
