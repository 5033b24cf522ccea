//! One-shot input commands: taps, swipes, mapped gestures, text, buttons.
//!
//! These go straight to the command endpoint without holding a control
//! session; `devhub control` is the long-lived counterpart.

use devhub_core::{
    ClientPoint, Console, DeviceCommand, GestureIntent, GestureMapper, SurfaceRect,
    directional_swipe,
};

use crate::cli::{DeviceArg, GestureArgs, GlobalOpts, OrientationArgs, SwipeArgs, TapArgs, TypeArgs};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Debug, Clone, Copy)]
pub enum Button {
    Home,
    Lock,
    Unlock,
}

impl Button {
    fn command(self) -> DeviceCommand {
        match self {
            Self::Home => DeviceCommand::Home,
            Self::Lock => DeviceCommand::Lock,
            Self::Unlock => DeviceCommand::Unlock,
        }
    }
}

/// Device pixels must be whole numbers.
#[allow(
    clippy::cast_possible_truncation,
    clippy::as_conversions,
    clippy::float_cmp
)]
fn device_px(field: &str, v: f64) -> Result<i64, CliError> {
    if !v.is_finite() || v.fract() != 0.0 {
        return Err(CliError::Validation {
            field: field.into(),
            reason: format!("'{v}' is not a whole device pixel"),
        });
    }
    Ok(v as i64)
}

fn print_intent(intent: &GestureIntent, global: &GlobalOpts) {
    let out = output::render_single(
        &global.output,
        intent,
        ToString::to_string,
        ToString::to_string,
    );
    output::print_output(&out, global.quiet);
}

pub async fn tap(console: &Console, args: TapArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let id = util::device_id(&args.device)?;
    let resp = console
        .send(&id, &DeviceCommand::Tap { x: args.x, y: args.y })
        .await?;
    util::acknowledge(&resp, global);
    Ok(())
}

pub async fn swipe(console: &Console, args: SwipeArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let id = util::device_id(&args.device)?;
    let command = match (args.direction, args.from, args.to) {
        (Some(direction), _, _) => {
            let resolution = console.resolution(&id).await?;
            let intent = directional_swipe(direction, resolution);
            tracing::debug!(%intent, %resolution, "directional swipe");
            intent.to_command()
        }
        (None, Some(from), Some(to)) => DeviceCommand::Swipe {
            x: device_px("from", from.0)?,
            y: device_px("from", from.1)?,
            end_x: device_px("to", to.0)?,
            end_y: device_px("to", to.1)?,
        },
        _ => {
            return Err(CliError::Validation {
                field: "swipe".into(),
                reason: "pass --from and --to, or --direction".into(),
            });
        }
    };
    let resp = console.send(&id, &command).await?;
    util::acknowledge(&resp, global);
    Ok(())
}

pub async fn gesture(
    console: &Console,
    args: GestureArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = util::device_id(&args.device)?;
    let surface = SurfaceRect::new(
        args.surface.left,
        args.surface.top,
        args.surface.width,
        args.surface.height,
    );
    if surface.is_degenerate() {
        return Err(CliError::Validation {
            field: "surface".into(),
            reason: "width and height must be greater than zero".into(),
        });
    }

    let mapper = GestureMapper::new(surface, Some(console.resolution(&id).await?));
    let down = ClientPoint::new(args.down.0, args.down.1);
    let up = ClientPoint::new(args.up.0, args.up.1);
    let (Some(start), Some(end)) = (mapper.map_point(down.x, down.y), mapper.map_point(up.x, up.y))
    else {
        return Err(CliError::Validation {
            field: "gesture".into(),
            reason: "points could not be mapped onto the device screen".into(),
        });
    };
    let intent = mapper.classify(start, end, down, up);

    if !args.dry_run {
        let resp = console.send(&id, &intent.to_command()).await?;
        util::acknowledge(&resp, global);
    }
    print_intent(&intent, global);
    Ok(())
}

pub async fn type_text(
    console: &Console,
    args: TypeArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = util::device_id(&args.device)?;
    if args.text.is_empty() {
        return Err(CliError::Validation {
            field: "text".into(),
            reason: "nothing to type".into(),
        });
    }
    let resp = console
        .send(&id, &DeviceCommand::TypeText { text: args.text })
        .await?;
    util::acknowledge(&resp, global);
    Ok(())
}

pub async fn orientation(
    console: &Console,
    args: OrientationArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = util::device_id(&args.device)?;
    let resp = console
        .send(
            &id,
            &DeviceCommand::UpdateStreamSettings {
                orientation: args.orientation,
            },
        )
        .await?;
    util::acknowledge(&resp, global);
    Ok(())
}

pub async fn button(
    console: &Console,
    args: DeviceArg,
    button: Button,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let id = util::device_id(&args.device)?;
    let resp = console.send(&id, &button.command()).await?;
    util::acknowledge(&resp, global);
    Ok(())
}
