use crate::config::RouteConfig;
use crate::models::{DirectoryUser, RedirectTarget, Role, SecondaryAuthAccountId, Session};

/// Pick where a directory user lands after bootstrap.
pub fn redirect_target(user: &DirectoryUser) -> RedirectTarget {
    if user.is_admin() {
        return RedirectTarget::Admin;
    }

    match (user.role, user.primary_board_id.as_deref().map(str::trim)) {
        (Role::Client, Some(board_id)) if !board_id.is_empty() => RedirectTarget::Board {
            board_id: board_id.to_string(),
        },
        _ => RedirectTarget::Dashboard,
    }
}

/// Compose the session handed back to the caller. No I/O.
pub fn build_session(
    directory_user: DirectoryUser,
    secondary_auth_account_id: SecondaryAuthAccountId,
    routes: &RouteConfig,
) -> Session {
    let redirect_target = redirect_target(&directory_user);
    let redirect_path = redirect_target.path(routes);

    Session {
        directory_user,
        secondary_auth_account_id,
        redirect_target,
        redirect_path,
        linked: true,
        access_token: None,
    }
}
