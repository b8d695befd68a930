use serde::Serialize;

/// A tracker project a client files tickets into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Project {
    /// Tracker project key, e.g. `HIR`.
    pub key: &'static str,
    /// Display name shown to the customer.
    pub name: &'static str,
}

/// Client slug -> tracker project. The slug is the path segment the form uses
/// (`/ticket/hiraoka`), the key is the tracker-side project key.
const PROJECTS: &[(&str, Project)] = &[
    (
        "goodyear",
        Project {
            key: "GB",
            name: "Goodyear Brasil",
        },
    ),
    (
        "modelo",
        Project {
            key: "DM",
            name: "Modelo Adobe",
        },
    ),
    (
        "adobe-suite",
        Project {
            key: "IAS",
            name: "Infracommerce Adobe Suite",
        },
    ),
    (
        "hiraoka",
        Project {
            key: "HIR",
            name: "HIRAOKA",
        },
    ),
];

/// Resolve a client slug to its project. Returns `None` for unknown clients;
/// the route layer turns that into a validation error.
pub fn lookup(slug: &str) -> Option<Project> {
    PROJECTS
        .iter()
        .find(|(id, _)| *id == slug)
        .map(|(_, project)| *project)
}

/// All configured clients in declaration order, for the client listing
/// endpoint.
pub fn all() -> impl Iterator<Item = (&'static str, Project)> {
    PROJECTS.iter().copied()
}
