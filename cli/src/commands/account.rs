use anyhow::Result;

use heft_core::auth::{AuthSession, AuthState, UserId};

use crate::config::Config;

pub(crate) fn cmd_login(
    config: &Config,
    session: &AuthSession,
    email: &str,
    json: bool,
) -> Result<()> {
    let user = UserId::from_email(email)?;
    config.save_session(&user)?;
    session.sign_in(user.clone());

    if json {
        println!("{}", serde_json::json!({ "signed_in": user }));
    } else {
        println!("Signed in as {user}");
    }
    Ok(())
}

pub(crate) fn cmd_logout(config: &Config, session: &AuthSession, json: bool) -> Result<()> {
    let was_signed_in = config.clear_session()?;
    session.sign_out();

    if json {
        println!("{}", serde_json::json!({ "signed_out": was_signed_in }));
    } else if was_signed_in {
        println!("Signed out");
    } else {
        eprintln!("Not signed in");
    }
    Ok(())
}

pub(crate) fn cmd_whoami(session: &AuthSession, json: bool) -> Result<()> {
    let state = session.current();
    if json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }
    match state {
        AuthState::SignedIn(user) => println!("{user}"),
        AuthState::Unauthenticated => eprintln!("Not signed in. Use `heft login <email>`."),
    }
    Ok(())
}
