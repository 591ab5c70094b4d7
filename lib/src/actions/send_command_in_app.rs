// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use ledger_dmk_apdu::Command;
use ledger_dmk_core::{
    engine::{DeviceAction, Intermediate, Machine, UserInteractionRequired},
    Error,
};

use super::OpenAppAction;
use crate::session::DEFAULT_UNLOCK_TIMEOUT;

/// Send a command to an application, opening the application first unless
/// `skip_open_app` is set
///
/// ```text
/// OpenApp -> CheckOpenApp -> SendCommand -> Success
///                         -> Error
/// ```
///
/// `required_interaction` is reported while the command is in flight.
#[derive(Clone, PartialEq, Debug)]
pub struct SendCommandInAppAction<C> {
    pub app_name: String,
    pub command: C,
    pub required_interaction: UserInteractionRequired,
    pub skip_open_app: bool,
    pub unlock_timeout: Duration,
}

#[derive(Debug)]
pub struct SendCommandInAppState<R> {
    response: Option<R>,
    error: Option<Error>,
}

impl<R> Default for SendCommandInAppState<R> {
    fn default() -> Self {
        Self {
            response: None,
            error: None,
        }
    }
}

type M<C> = Machine<
    SendCommandInAppState<<C as Command>::Response>,
    Intermediate,
    <C as Command>::Response,
    Error,
>;

impl<C: Command + Clone + 'static> SendCommandInAppAction<C> {
    pub fn new(app_name: &str, command: C, required_interaction: UserInteractionRequired) -> Self {
        Self {
            app_name: app_name.to_string(),
            command,
            required_interaction,
            skip_open_app: false,
            unlock_timeout: DEFAULT_UNLOCK_TIMEOUT,
        }
    }

    /// Send the command without checking the running application
    pub fn skip_open_app(mut self) -> Self {
        self.skip_open_app = true;
        self
    }
}

impl<C> DeviceAction for SendCommandInAppAction<C>
where
    C: Command + Clone + 'static,
    C::Response: Clone,
{
    type State = SendCommandInAppState<C::Response>;
    type Output = C::Response;

    fn make_machine(&self) -> Result<M<C>, Error> {
        let app_name = self.app_name.clone();
        let unlock_timeout = self.unlock_timeout;
        let interaction = self.required_interaction;
        let cmd = self.command.clone();

        let initial = match self.skip_open_app {
            true => "SendCommand",
            false => "OpenApp",
        };

        M::<C>::builder(
            "send_command_in_app",
            SendCommandInAppState::default(),
            Intermediate::none(),
        )
        .initial(initial)
        .state("OpenApp", |s| {
            s.nested(
                "open_app",
                move |_ctx| OpenAppAction::machine(&app_name, unlock_timeout),
                "CheckOpenApp",
                |ctx, r| {
                    if let Err(e) = r {
                        ctx.state.error = Some(e);
                    }
                },
            )
        })
        .state("CheckOpenApp", |s| {
            s.always_if("Error", |ctx| ctx.state.error.is_some())
                .always("SendCommand")
        })
        .state("SendCommand", |s| {
            s.entry(move |ctx| ctx.intermediate = interaction.into())
                .exit(|ctx| ctx.intermediate = Intermediate::none())
                .task(
                    "send_command",
                    move |_ctx, api| {
                        let cmd = cmd.clone();
                        async move {
                            match interaction {
                                UserInteractionRequired::None => api.send_command(&cmd).await,
                                _ => api.send_interactive_command(&cmd).await,
                            }
                        }
                    },
                    |t| {
                        t.on_done("Success", |ctx, r| ctx.state.response = Some(r))
                            .on_error("Error", |ctx, e| ctx.state.error = Some(e))
                    },
                )
        })
        .final_state("Success")
        .final_state("Error")
        .output(|ctx| match (&ctx.state.error, &ctx.state.response) {
            (Some(e), _) => Err(e.clone()),
            (None, Some(r)) => Ok(r.clone()),
            (None, None) => Err(Error::Unknown("missing command response".to_string())),
        })
        .build()
    }
}
